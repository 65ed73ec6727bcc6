//! Presence updater: keeps `profiles.last_seen` fresh for the signed-in
//! identity.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info};

use garden_backend::schema::{columns, tables};
use garden_backend::{Backend, Filter};
use garden_config::schema::TrackingConfig;

use crate::lock;
use crate::policy::{absorb, Operation};
use crate::scheduler::{secs, spawn_interval, TaskHandle};

struct PresenceLoop {
    identity_id: String,
    _task: TaskHandle,
}

pub struct PresenceUpdater {
    backend: Arc<dyn Backend>,
    interval: Duration,
    enabled: bool,
    current: Mutex<Option<PresenceLoop>>,
}

impl PresenceUpdater {
    pub fn new(backend: Arc<dyn Backend>, config: &TrackingConfig) -> Self {
        Self {
            backend,
            interval: secs(config.presence_interval_secs),
            enabled: config.enabled,
            current: Mutex::new(None),
        }
    }

    /// Mark `identity_id` active now and on every interval after.
    ///
    /// A loop for another identity is cancelled first; beginning again for
    /// the same identity keeps the running loop.
    pub fn begin_presence_loop(&self, identity_id: &str) {
        if !self.enabled {
            return;
        }

        let mut current = lock(&self.current);
        if current.as_ref().is_some_and(|c| c.identity_id == identity_id) {
            debug!(identity_id, "Presence loop already running");
            return;
        }
        if current.take().is_some() {
            debug!("Presence loop replaced for new identity");
        }

        info!(identity_id, interval_secs = self.interval.as_secs(), "Presence loop started");
        let backend = Arc::clone(&self.backend);
        let id = identity_id.to_string();
        let task = spawn_interval(self.interval, move || {
            let backend = Arc::clone(&backend);
            let id = id.clone();
            async move { touch(backend.as_ref(), &id).await }
        });

        *current = Some(PresenceLoop {
            identity_id: identity_id.to_string(),
            _task: task,
        });
    }

    /// Stop updating. No further updates are sent.
    pub fn end_presence_loop(&self) {
        if let Some(ended) = lock(&self.current).take() {
            info!(identity_id = %ended.identity_id, "Presence loop stopped");
        }
    }

    pub fn active_identity(&self) -> Option<String> {
        lock(&self.current).as_ref().map(|c| c.identity_id.clone())
    }
}

async fn touch(backend: &dyn Backend, identity_id: &str) {
    let filter = Filter::new().eq(columns::ID, identity_id);
    let mut patch = Map::new();
    patch.insert(columns::LAST_SEEN.to_string(), Value::from(Utc::now().to_rfc3339()));
    let result = backend
        .update(tables::PROFILES, &filter, Value::Object(patch))
        .await;
    if absorb(Operation::Presence, result).is_some() {
        debug!(identity_id, "Presence updated");
    }
}
