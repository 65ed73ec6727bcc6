//! Session tracker: start, periodic heartbeat, end.
//!
//! Each session is driven by one lifecycle task that sends `start`, then a
//! heartbeat every period, and `end` once cancelled. Running every signal
//! from the same task keeps them ordered without relying on the network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garden_backend::schema::functions;
use garden_backend::Backend;
use garden_common::{tab_session_id, SessionId};
use garden_config::schema::TrackingConfig;

use crate::lock;
use crate::policy::{absorb, Operation};
use crate::scheduler::{secs, TaskHandle};

/// A bounded interval of this tab's presence on one view.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: SessionId,
    pub page_path: String,
    pub lab_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    fn is_for(&self, page_path: &str, lab_id: Option<&str>) -> bool {
        self.page_path == page_path && self.lab_id.as_deref() == lab_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Start,
    Heartbeat,
    End,
}

impl Signal {
    fn operation(self) -> Operation {
        match self {
            Self::Start => Operation::SessionStart,
            Self::Heartbeat => Operation::Heartbeat,
            Self::End => Operation::SessionEnd,
        }
    }

    fn payload(self, session: &Session) -> Value {
        match self {
            Self::Start => json!({
                "action": "start",
                "session_id": session.session_id,
                "page_path": session.page_path,
                "lab_id": session.lab_id,
                "tab_id": tab_session_id(),
                "started_at": session.started_at.to_rfc3339(),
            }),
            Self::Heartbeat => json!({
                "action": "heartbeat",
                "session_id": session.session_id,
            }),
            Self::End => json!({
                "action": "end",
                "session_id": session.session_id,
            }),
        }
    }
}

struct ActiveSession {
    session: Session,
    pulse: mpsc::UnboundedSender<()>,
    // Dropping the handle ends the session.
    task: TaskHandle,
}

#[derive(Default)]
struct TrackerState {
    active: Option<ActiveSession>,
    /// Teardown of the last ended session, awaited by the next start.
    ending: Option<JoinHandle<()>>,
}

/// Owns at most one live session at a time.
pub struct SessionTracker {
    backend: Arc<dyn Backend>,
    heartbeat_interval: Duration,
    enabled: bool,
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    pub fn new(backend: Arc<dyn Backend>, config: &TrackingConfig) -> Self {
        Self {
            backend,
            heartbeat_interval: secs(config.heartbeat_interval_secs),
            enabled: config.enabled,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Start a session for `page_path` and return its id.
    ///
    /// Starting again for the same view while it is live is a caller error:
    /// it is logged and the live session's id is returned. Starting for a
    /// different view ends the live session first.
    pub fn start_session(&self, page_path: &str, lab_id: Option<&str>) -> SessionId {
        if !self.enabled {
            debug!(page_path, "Tracking disabled, session not started");
            return SessionId::new();
        }

        let mut state = lock(&self.state);
        if let Some(current) = state.active.as_ref() {
            if current.session.is_for(page_path, lab_id) {
                warn!(
                    session_id = %current.session.session_id,
                    page_path,
                    "Session already started for this view"
                );
                return current.session.session_id.clone();
            }
        }

        let previous = match state.active.take() {
            Some(prev) => {
                debug!(session_id = %prev.session.session_id, "Ending session superseded by navigation");
                prev.task.finish()
            }
            None => state.ending.take(),
        };

        let session = Session {
            session_id: SessionId::new(),
            page_path: page_path.to_string(),
            lab_id: lab_id.map(str::to_string),
            started_at: Utc::now(),
        };
        let session_id = session.session_id.clone();
        info!(session_id = %session_id, page_path, lab_id, "Session started");

        let (pulse, pulse_rx) = mpsc::unbounded_channel();
        let backend = Arc::clone(&self.backend);
        let period = self.heartbeat_interval;
        let task_session = session.clone();
        let task = TaskHandle::spawn(move |token| {
            run_session(backend, task_session, period, previous, pulse_rx, token)
        });

        state.active = Some(ActiveSession {
            session,
            pulse,
            task,
        });
        session_id
    }

    /// Send an extra heartbeat for the live session.
    pub fn heartbeat(&self, session_id: &SessionId) {
        let state = lock(&self.state);
        match state.active.as_ref() {
            Some(current) if &current.session.session_id == session_id => {
                let _ = current.pulse.send(());
            }
            _ => debug!(session_id = %session_id, "Heartbeat for inactive session ignored"),
        }
    }

    /// End the session. Unknown or already-ended ids are a no-op.
    pub fn end_session(&self, session_id: &SessionId) {
        let mut state = lock(&self.state);
        match state.active.as_ref() {
            Some(current) if &current.session.session_id == session_id => {
                info!(session_id = %session_id, "Session ended");
                let ending = state.active.take().and_then(|ended| ended.task.finish());
                state.ending = ending;
            }
            _ => debug!(session_id = %session_id, "End for inactive session ignored"),
        }
    }

    /// Wait until the last ended session has sent its `end` signal.
    pub async fn flush(&self) {
        let ending = lock(&self.state).ending.take();
        if let Some(ending) = ending {
            let _ = ending.await;
        }
    }

    pub fn active_session(&self) -> Option<Session> {
        lock(&self.state)
            .active
            .as_ref()
            .map(|a| a.session.clone())
    }
}

async fn send_signal(backend: &dyn Backend, signal: Signal, session: &Session) {
    let result = backend
        .invoke_function(functions::SESSION_TRACKER, signal.payload(session))
        .await
        .map(|_| ());
    absorb(signal.operation(), result);
}

async fn run_session(
    backend: Arc<dyn Backend>,
    session: Session,
    period: Duration,
    previous: Option<JoinHandle<()>>,
    mut pulse_rx: mpsc::UnboundedReceiver<()>,
    token: CancellationToken,
) {
    // The previous session's end goes out before this start.
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    send_signal(backend.as_ref(), Signal::Start, &session).await;

    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
            Some(()) = pulse_rx.recv() => {}
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = send_signal(backend.as_ref(), Signal::Heartbeat, &session) => {}
        }
    }

    send_signal(backend.as_ref(), Signal::End, &session).await;
}
