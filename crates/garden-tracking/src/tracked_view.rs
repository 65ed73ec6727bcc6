//! A mounted view: one tracking session plus its page views.

use std::sync::Arc;

use tracing::debug;

use garden_backend::Backend;
use garden_common::SessionId;
use garden_config::schema::TrackingConfig;

use crate::page_view::PageViewRecorder;
use crate::session::SessionTracker;

/// Ties the session tracker and page view recorder to a view's lifecycle.
///
/// Navigating to another route ends the current session before the next
/// one starts. Dropping the view unmounts it.
pub struct TrackedView {
    sessions: SessionTracker,
    page_views: PageViewRecorder,
    current: Option<SessionId>,
}

impl TrackedView {
    pub fn new(backend: Arc<dyn Backend>, config: &TrackingConfig) -> Self {
        Self {
            sessions: SessionTracker::new(Arc::clone(&backend), config),
            page_views: PageViewRecorder::new(backend, config),
            current: None,
        }
    }

    pub fn mount(&mut self, path: &str, lab_id: Option<&str>, user_id: Option<&str>) -> SessionId {
        let session_id = self.sessions.start_session(path, lab_id);
        self.page_views.set_tracking_session(Some(session_id.clone()));
        self.page_views.record_if_new_path(path, user_id);
        self.current = Some(session_id.clone());
        session_id
    }

    /// Move to `path`. Re-renders of the current route change nothing.
    pub fn navigate(&mut self, path: &str, lab_id: Option<&str>, user_id: Option<&str>) -> SessionId {
        if let Some(active) = self.sessions.active_session() {
            if active.page_path == path && active.lab_id.as_deref() == lab_id {
                debug!(page_path = path, "Navigation to current route ignored");
                return active.session_id;
            }
        }
        self.unmount();
        self.mount(path, lab_id, user_id)
    }

    pub fn unmount(&mut self) {
        if let Some(session_id) = self.current.take() {
            self.sessions.end_session(&session_id);
        }
        self.page_views.set_tracking_session(None);
    }

    /// Wait for the last unmounted session to finish its teardown.
    pub async fn flush(&self) {
        self.sessions.flush().await;
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }
}

impl Drop for TrackedView {
    fn drop(&mut self) {
        self.unmount();
    }
}
