//! Page view recorder: one append-only record per distinct route entry.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use garden_backend::schema::tables;
use garden_backend::Backend;
use garden_common::{tab_session_id, SessionId, TrackingError};
use garden_config::schema::TrackingConfig;

use crate::lock;
use crate::policy::{absorb, Operation};

/// One row of the `page_views` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageViewRecord {
    pub page_path: String,
    pub user_id: Option<String>,
    /// Per-tab grouping key.
    pub session_id: String,
    /// Tracking session of the view that produced this record.
    pub tracking_session_id: Option<SessionId>,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderState {
    last_path: Option<String>,
    tracking_session: Option<SessionId>,
}

pub struct PageViewRecorder {
    backend: Arc<dyn Backend>,
    enabled: bool,
    state: Mutex<RecorderState>,
}

impl PageViewRecorder {
    pub fn new(backend: Arc<dyn Backend>, config: &TrackingConfig) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            state: Mutex::new(RecorderState::default()),
        }
    }

    /// Link subsequent records to a tracking session. A different session
    /// starts with no previous path, so its first entry is always recorded.
    pub fn set_tracking_session(&self, session_id: Option<SessionId>) {
        let mut state = lock(&self.state);
        if state.tracking_session != session_id {
            state.last_path = None;
            state.tracking_session = session_id;
        }
    }

    pub fn last_path(&self) -> Option<String> {
        lock(&self.state).last_path.clone()
    }

    /// Record a view of `path` unless it repeats the previous one.
    ///
    /// Returns whether a record was submitted. The insert runs in the
    /// background; failures are logged at debug level only.
    pub fn record_if_new_path(&self, path: &str, user_id: Option<&str>) -> bool {
        if !self.enabled {
            return false;
        }

        let record = {
            let mut state = lock(&self.state);
            if state.last_path.as_deref() == Some(path) {
                return false;
            }
            state.last_path = Some(path.to_string());
            PageViewRecord {
                page_path: path.to_string(),
                user_id: user_id.map(str::to_string),
                session_id: tab_session_id().to_string(),
                tracking_session_id: state.tracking_session.clone(),
                viewed_at: Utc::now(),
            }
        };

        debug!(page_path = path, "Recording page view");
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let result = match serde_json::to_value(&record) {
                Ok(row) => backend.insert(tables::PAGE_VIEWS, row).await,
                Err(e) => Err(TrackingError::Decode(e.to_string())),
            };
            absorb(Operation::PageView, result);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use garden_backend::{MemoryBackend, MemoryOp};

    use super::*;

    fn recorder(memory: &MemoryBackend) -> PageViewRecorder {
        PageViewRecorder::new(Arc::new(memory.clone()), &TrackingConfig::default())
    }

    async fn paths(memory: &MemoryBackend) -> Vec<String> {
        memory
            .rows(tables::PAGE_VIEWS)
            .await
            .iter()
            .filter_map(|r| r["page_path"].as_str().map(str::to_string))
            .collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_record_per_distinct_consecutive_path() {
        let memory = MemoryBackend::new();
        let recorder = recorder(&memory);

        let visits = ["/", "/", "/labs", "/labs", "/labs", "/", "/profile", "/profile"];
        for path in visits {
            recorder.record_if_new_path(path, None);
        }
        settle().await;

        assert_eq!(paths(&memory).await, vec!["/", "/labs", "/", "/profile"]);
        assert_eq!(recorder.last_path().as_deref(), Some("/profile"));
    }

    #[tokio::test(start_paused = true)]
    async fn records_share_tab_id_and_carry_user() {
        let memory = MemoryBackend::new();
        let recorder = recorder(&memory);
        let session = SessionId::new();
        recorder.set_tracking_session(Some(session.clone()));

        recorder.record_if_new_path("/labs", Some("user-1"));
        recorder.record_if_new_path("/dashboard", None);
        settle().await;

        let rows = memory.rows(tables::PAGE_VIEWS).await;
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row["session_id"], tab_session_id());
            assert_eq!(row["tracking_session_id"], session.as_str());
        }
        assert_eq!(rows[0]["user_id"], "user-1");
        assert!(rows[1]["user_id"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn new_tracking_session_records_same_path_again() {
        let memory = MemoryBackend::new();
        let recorder = recorder(&memory);
        let first = SessionId::new();

        recorder.set_tracking_session(Some(first.clone()));
        assert!(recorder.record_if_new_path("/dashboard", None));
        recorder.set_tracking_session(Some(first));
        assert!(!recorder.record_if_new_path("/dashboard", None));

        recorder.set_tracking_session(Some(SessionId::new()));
        assert!(recorder.last_path().is_none());
        assert!(recorder.record_if_new_path("/dashboard", None));
        settle().await;

        assert_eq!(paths(&memory).await, vec!["/dashboard", "/dashboard"]);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_failure_is_swallowed_and_path_still_deduped() {
        let memory = MemoryBackend::new();
        let recorder = recorder(&memory);
        memory
            .fail_next(MemoryOp::Insert, TrackingError::Network("offline".into()))
            .await;

        assert!(recorder.record_if_new_path("/labs", None));
        settle().await;
        assert!(!recorder.record_if_new_path("/labs", None));
        assert!(recorder.record_if_new_path("/", None));
        settle().await;

        assert_eq!(paths(&memory).await, vec!["/"]);
    }

    #[tokio::test]
    async fn disabled_recorder_is_inert() {
        let memory = MemoryBackend::new();
        let config = TrackingConfig {
            enabled: false,
            ..TrackingConfig::default()
        };
        let recorder = PageViewRecorder::new(Arc::new(memory.clone()), &config);
        assert!(!recorder.record_if_new_path("/labs", None));
        assert!(recorder.last_path().is_none());
    }
}
