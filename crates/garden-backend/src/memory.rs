//! In-process backend with the same observable semantics as Supabase.
//!
//! Rows are JSON objects grouped by table. Inserts and updates fan out to
//! matching subscriptions. Function and procedure calls are recorded and
//! answered from canned responses. Failures and latency can be injected
//! per operation, which is how the tracking tests exercise error paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use garden_common::TrackingError;

use crate::change::{ChangeEvent, ChangeKind, Subscription};
use crate::filter::Filter;
use crate::Backend;

/// Buffered events per subscription before new ones are dropped.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Operations that failures and latency can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Insert,
    Select,
    Count,
    Update,
    Subscribe,
    Rpc,
    Function,
}

/// A recorded procedure or function call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub name: String,
    pub payload: Value,
}

struct Listener {
    table: String,
    filter: Filter,
    kinds: Vec<ChangeKind>,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Value>>,
    listeners: HashMap<String, Listener>,
    rpc_calls: Vec<RecordedCall>,
    function_calls: Vec<RecordedCall>,
    responses: HashMap<String, Value>,
    queued_failures: HashMap<MemoryOp, VecDeque<TrackingError>>,
    sticky_failures: HashMap<MemoryOp, TrackingError>,
    latency: HashMap<MemoryOp, Duration>,
}

impl MemoryState {
    fn take_failure(&mut self, op: MemoryOp) -> Option<TrackingError> {
        if let Some(err) = self.queued_failures.get_mut(&op).and_then(|q| q.pop_front()) {
            return Some(err);
        }
        self.sticky_failures.get(&op).cloned()
    }

    fn notify(&mut self, table: &str, kind: ChangeKind, record: &Value, old_record: &Value) {
        self.listeners.retain(|_, l| !l.sender.is_closed());
        for (id, listener) in &self.listeners {
            if listener.table != table || !listener.kinds.contains(&kind) {
                continue;
            }
            if !listener.filter.matches(record) && !listener.filter.matches(old_record) {
                continue;
            }
            let event = ChangeEvent {
                table: table.to_string(),
                kind,
                record: record.clone(),
                old_record: old_record.clone(),
            };
            if listener.sender.try_send(event).is_err() {
                warn!(subscription = %id, "Change event dropped: subscriber not keeping up");
            }
        }
    }
}

/// Cheaply cloneable in-memory backend; clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    next_subscription: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `error` (queued, one-shot).
    pub async fn fail_next(&self, op: MemoryOp, error: TrackingError) {
        self.state
            .write()
            .await
            .queued_failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make every call of `op` fail until [`MemoryBackend::clear_failures`].
    pub async fn fail_always(&self, op: MemoryOp, error: TrackingError) {
        self.state.write().await.sticky_failures.insert(op, error);
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.queued_failures.clear();
        state.sticky_failures.clear();
    }

    /// Delay every call of `op` by `delay` before it takes effect.
    pub async fn set_latency(&self, op: MemoryOp, delay: Duration) {
        self.state.write().await.latency.insert(op, delay);
    }

    /// Canned response for a procedure or function name.
    pub async fn set_response(&self, name: &str, value: Value) {
        self.state
            .write()
            .await
            .responses
            .insert(name.to_string(), value);
    }

    /// Seed a row without emitting change events.
    pub async fn seed(&self, table: &str, row: Value) {
        self.state
            .write()
            .await
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .read()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn function_calls(&self, name: &str) -> Vec<RecordedCall> {
        self.state
            .read()
            .await
            .function_calls
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    pub async fn rpc_calls(&self, name: &str) -> Vec<RecordedCall> {
        self.state
            .read()
            .await
            .rpc_calls
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    /// Subscriptions on `table` whose handle is still alive.
    pub async fn active_subscriptions(&self, table: &str) -> usize {
        self.state
            .read()
            .await
            .listeners
            .values()
            .filter(|l| l.table == table && !l.sender.is_closed())
            .count()
    }

    /// End every live subscription on `table`, as a backend-side channel
    /// close would. Their handles then yield `None`.
    pub async fn drop_subscriptions(&self, table: &str) -> usize {
        let mut state = self.state.write().await;
        let before = state.listeners.len();
        state.listeners.retain(|_, l| l.table != table);
        before - state.listeners.len()
    }

    /// Apply latency, then any injected failure for `op`.
    async fn enter(&self, op: MemoryOp) -> Result<(), TrackingError> {
        let delay = self.state.read().await.latency.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.state.write().await.take_failure(op) {
            Some(err) => {
                debug!(?op, error = %err, "Injected memory backend failure");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert(&self, table: &str, record: Value) -> Result<(), TrackingError> {
        self.enter(MemoryOp::Insert).await?;
        if !record.is_object() {
            return Err(TrackingError::Remote {
                status: 400,
                message: "record must be a JSON object".into(),
            });
        }
        let mut state = self.state.write().await;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        state.notify(table, ChangeKind::Insert, &record, &Value::Null);
        Ok(())
    }

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, TrackingError> {
        self.enter(MemoryOp::Select).await?;
        let state = self.state.read().await;
        Ok(state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn aggregate_count(&self, table: &str, filter: &Filter) -> Result<u64, TrackingError> {
        self.enter(MemoryOp::Count).await?;
        let state = self.state.read().await;
        let count = state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<(), TrackingError> {
        self.enter(MemoryOp::Update).await?;
        let Some(patch) = patch.as_object().cloned() else {
            return Err(TrackingError::Remote {
                status: 400,
                message: "patch must be a JSON object".into(),
            });
        };

        let mut state = self.state.write().await;
        let mut changed = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                let old = row.clone();
                if let Some(obj) = row.as_object_mut() {
                    for (key, value) in &patch {
                        obj.insert(key.clone(), value.clone());
                    }
                }
                changed.push((row.clone(), old));
            }
        }
        for (record, old) in changed {
            state.notify(table, ChangeKind::Update, &record, &old);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        table: &str,
        filter: &Filter,
        kinds: &[ChangeKind],
    ) -> Result<Subscription, TrackingError> {
        self.enter(MemoryOp::Subscribe).await?;
        let id = format!(
            "memory-{}",
            self.next_subscription.fetch_add(1, Ordering::Relaxed)
        );
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.state.write().await.listeners.insert(
            id.clone(),
            Listener {
                table: table.to_string(),
                filter: filter.clone(),
                kinds: kinds.to_vec(),
                sender,
            },
        );
        debug!(subscription = %id, table, "Memory subscription opened");
        // Closed listeners are pruned on the next notify.
        Ok(Subscription::new(id, receiver, None))
    }

    async fn rpc(&self, name: &str, payload: Value) -> Result<Value, TrackingError> {
        {
            let mut state = self.state.write().await;
            state.rpc_calls.push(RecordedCall {
                name: name.to_string(),
                payload,
            });
        }
        self.enter(MemoryOp::Rpc).await?;
        let state = self.state.read().await;
        Ok(state.responses.get(name).cloned().unwrap_or(Value::Null))
    }

    async fn invoke_function(&self, name: &str, payload: Value) -> Result<Value, TrackingError> {
        {
            let mut state = self.state.write().await;
            state.function_calls.push(RecordedCall {
                name: name.to_string(),
                payload,
            });
        }
        self.enter(MemoryOp::Function).await?;
        let state = self.state.read().await;
        Ok(state.responses.get(name).cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn insert_select_and_count() {
        let backend = MemoryBackend::new();
        backend
            .insert("messages", json!({"recipient_id": "a", "read": false}))
            .await
            .unwrap();
        backend
            .insert("messages", json!({"recipient_id": "a", "read": true}))
            .await
            .unwrap();
        backend
            .insert("messages", json!({"recipient_id": "b", "read": false}))
            .await
            .unwrap();

        let unread_a = Filter::new().eq("recipient_id", "a").eq("read", false);
        assert_eq!(backend.aggregate_count("messages", &unread_a).await.unwrap(), 1);
        assert_eq!(backend.select("messages", &Filter::new()).await.unwrap().len(), 3);
        assert_eq!(backend.aggregate_count("missing", &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_merges_patch_into_matching_rows() {
        let backend = MemoryBackend::new();
        backend.seed("profiles", json!({"id": "u1", "tier": "free"})).await;
        backend.seed("profiles", json!({"id": "u2", "tier": "free"})).await;

        backend
            .update(
                "profiles",
                &Filter::new().eq("id", "u1"),
                json!({"last_seen": "now"}),
            )
            .await
            .unwrap();

        let rows = backend.rows("profiles").await;
        assert_eq!(rows[0]["last_seen"], "now");
        assert_eq!(rows[0]["tier"], "free");
        assert!(rows[1].get("last_seen").is_none());
    }

    #[tokio::test]
    async fn rejects_non_object_records() {
        let backend = MemoryBackend::new();
        let err = backend.insert("t", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, TrackingError::Remote { status: 400, .. }));
    }

    #[tokio::test]
    async fn subscriptions_receive_matching_changes_only() {
        let backend = MemoryBackend::new();
        let mut sub = backend
            .subscribe(
                "messages",
                &Filter::new().eq("recipient_id", "a"),
                &[ChangeKind::Insert, ChangeKind::Update],
            )
            .await
            .unwrap();

        backend
            .insert("messages", json!({"id": 1, "recipient_id": "b", "read": false}))
            .await
            .unwrap();
        backend
            .insert("messages", json!({"id": 2, "recipient_id": "a", "read": false}))
            .await
            .unwrap();

        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.record["id"], 2);

        backend
            .update("messages", &Filter::new().eq("id", 2), json!({"read": true}))
            .await
            .unwrap();
        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.old_record["read"], false);
        assert_eq!(event.record["read"], true);
    }

    #[tokio::test]
    async fn dropped_subscriptions_stop_counting() {
        let backend = MemoryBackend::new();
        let sub = backend
            .subscribe("messages", &Filter::new(), &[ChangeKind::Insert])
            .await
            .unwrap();
        assert_eq!(backend.active_subscriptions("messages").await, 1);
        drop(sub);
        assert_eq!(backend.active_subscriptions("messages").await, 0);
    }

    #[tokio::test]
    async fn backend_side_close_ends_the_feed() {
        let backend = MemoryBackend::new();
        let mut sub = backend
            .subscribe("messages", &Filter::new(), &[ChangeKind::Insert])
            .await
            .unwrap();
        assert_eq!(backend.drop_subscriptions("profiles").await, 0);
        assert_eq!(backend.drop_subscriptions("messages").await, 1);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn queued_failure_is_one_shot() {
        let backend = MemoryBackend::new();
        backend.fail_next(MemoryOp::Count, TrackingError::Closed).await;

        assert_eq!(
            backend.aggregate_count("t", &Filter::new()).await,
            Err(TrackingError::Closed)
        );
        assert_eq!(backend.aggregate_count("t", &Filter::new()).await, Ok(0));
    }

    #[tokio::test]
    async fn sticky_failure_until_cleared() {
        let backend = MemoryBackend::new();
        backend
            .fail_always(MemoryOp::Insert, TrackingError::Network("down".into()))
            .await;
        assert!(backend.insert("t", json!({})).await.is_err());
        assert!(backend.insert("t", json!({})).await.is_err());
        backend.clear_failures().await;
        assert!(backend.insert("t", json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn calls_are_recorded_even_when_failing() {
        let backend = MemoryBackend::new();
        backend.set_response("has_role", json!(true)).await;
        assert_eq!(
            backend.rpc("has_role", json!({"_user_id": "u1"})).await,
            Ok(json!(true))
        );

        backend
            .fail_next(MemoryOp::Function, TrackingError::RateLimited)
            .await;
        assert_eq!(
            backend.invoke_function("translate", json!({"text": "hola"})).await,
            Err(TrackingError::RateLimited)
        );
        assert_eq!(backend.function_calls("translate").await.len(), 1);
        assert_eq!(backend.rpc_calls("has_role").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_the_call() {
        let backend = MemoryBackend::new();
        backend
            .set_latency(MemoryOp::Count, Duration::from_secs(2))
            .await;

        let start = tokio::time::Instant::now();
        backend.aggregate_count("t", &Filter::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
