//! Unread counter: live count of unread messages addressed to the current
//! identity.
//!
//! The count is never adjusted locally. Every change notification triggers
//! a fresh aggregate query, so duplicate or partial notifications cannot
//! make it drift.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garden_backend::schema::{columns, tables};
use garden_backend::{Backend, ChangeKind, Filter, Subscription};
use garden_common::TrackingError;
use garden_config::schema::TrackingConfig;

use crate::lock;
use crate::policy::{absorb, Operation};
use crate::scheduler::TaskHandle;

/// Called with the new count after every successful recount.
pub type UnreadCallback = Arc<dyn Fn(u64) + Send + Sync>;

const WATCHED_CHANGES: [ChangeKind; 2] = [ChangeKind::Insert, ChangeKind::Update];

/// First delay before reopening a failed or closed change feed.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(60);

fn unread_filter(identity_id: &str) -> Filter {
    Filter::new()
        .eq(columns::RECIPIENT_ID, identity_id)
        .eq(columns::READ, false)
}

async fn count_unread(backend: &dyn Backend, identity_id: &str) -> Result<u64, TrackingError> {
    backend
        .aggregate_count(tables::MESSAGES, &unread_filter(identity_id))
        .await
}

/// Count plus the generation of the scope allowed to write it.
struct Shared {
    generation: Mutex<u64>,
    count: watch::Sender<u64>,
    /// Last successful count per identity.
    last_known: Mutex<HashMap<String, u64>>,
}

impl Shared {
    /// Start a new scope: older scopes can no longer publish.
    fn advance(&self) -> u64 {
        let mut generation = lock(&self.generation);
        *generation += 1;
        self.count.send_replace(0);
        *generation
    }

    fn remember(&self, identity_id: &str, count: u64) {
        lock(&self.last_known).insert(identity_id.to_string(), count);
    }

    fn last_known(&self, identity_id: &str) -> Option<u64> {
        lock(&self.last_known).get(identity_id).copied()
    }

    fn publish(
        &self,
        generation: u64,
        identity_id: &str,
        count: u64,
        on_change: Option<&UnreadCallback>,
    ) {
        let current = lock(&self.generation);
        if *current != generation {
            debug!(generation, current = *current, "Discarding unread count from stale scope");
            return;
        }
        self.count.send_replace(count);
        drop(current);
        self.remember(identity_id, count);
        if let Some(on_change) = on_change {
            on_change(count);
        }
    }
}

struct Scope {
    identity_id: String,
    task: TaskHandle,
}

pub struct UnreadCounter {
    backend: Arc<dyn Backend>,
    enabled: bool,
    shared: Arc<Shared>,
    scope: Mutex<Option<Scope>>,
}

impl UnreadCounter {
    pub fn new(backend: Arc<dyn Backend>, config: &TrackingConfig) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            backend,
            enabled: config.enabled,
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                count,
                last_known: Mutex::new(HashMap::new()),
            }),
            scope: Mutex::new(None),
        }
    }

    /// One aggregate query for `identity_id`. On failure the last count
    /// seen for that same identity is returned, or zero if there is none.
    pub async fn get_unread_count(&self, identity_id: &str) -> u64 {
        let result = count_unread(self.backend.as_ref(), identity_id).await;
        match absorb(Operation::UnreadCount, result) {
            Some(count) => {
                self.shared.remember(identity_id, count);
                count
            }
            None => self.shared.last_known(identity_id).unwrap_or(0),
        }
    }

    /// Follow the unread count of `identity_id`.
    ///
    /// Any previous identity's subscription is closed first and the count
    /// restarts from zero until the new identity's first query lands.
    pub fn subscribe(&self, identity_id: &str, on_change: Option<UnreadCallback>) {
        if !self.enabled {
            return;
        }

        let mut scope = lock(&self.scope);
        if scope
            .as_ref()
            .is_some_and(|s| s.identity_id == identity_id && !s.task.is_finished())
        {
            debug!(identity_id, "Unread subscription already open");
            return;
        }
        scope.take();

        let generation = self.shared.advance();
        info!(identity_id, generation, "Following unread messages");

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let id = identity_id.to_string();
        let task = TaskHandle::spawn(move |token| async move {
            let scope = ScopeTask {
                backend,
                shared,
                generation,
                identity_id: id,
                on_change,
                token,
            };
            scope.run().await;
        });

        *scope = Some(Scope {
            identity_id: identity_id.to_string(),
            task,
        });
    }

    /// Drop the current identity (logout): close its subscription and
    /// reset the count to zero.
    pub fn clear(&self) {
        if let Some(scope) = lock(&self.scope).take() {
            info!(identity_id = %scope.identity_id, "Unread subscription closed");
        }
        self.shared.advance();
    }

    pub fn count(&self) -> u64 {
        *self.shared.count.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shared.count.subscribe()
    }

    pub fn identity(&self) -> Option<String> {
        lock(&self.scope).as_ref().map(|s| s.identity_id.clone())
    }
}

struct ScopeTask {
    backend: Arc<dyn Backend>,
    shared: Arc<Shared>,
    generation: u64,
    identity_id: String,
    on_change: Option<UnreadCallback>,
    token: CancellationToken,
}

impl ScopeTask {
    /// Keep a change feed open until cancelled. A feed that cannot be
    /// opened, or that the backend closes, is reopened with backoff.
    async fn run(self) {
        let filter = Filter::new().eq(columns::RECIPIENT_ID, self.identity_id.as_str());
        let mut delay = RESUBSCRIBE_DELAY;
        loop {
            // Subscribe before counting so no insert slips between them.
            let subscription = tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                result = self.backend.subscribe(tables::MESSAGES, &filter, &WATCHED_CHANGES) => {
                    absorb(Operation::UnreadSubscribe, result)
                }
            };

            self.recount().await;

            if let Some(subscription) = subscription {
                let opened = Instant::now();
                if !self.follow(subscription).await {
                    return;
                }
                if opened.elapsed() >= MAX_RESUBSCRIBE_DELAY {
                    delay = RESUBSCRIBE_DELAY;
                }
            }

            debug!(
                identity_id = %self.identity_id,
                delay_ms = delay.as_millis() as u64,
                "Reopening unread subscription"
            );
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(MAX_RESUBSCRIBE_DELAY);
        }
    }

    /// Recount on every change. `false` once cancelled, `true` when the
    /// backend ended the feed.
    async fn follow(&self, mut subscription: Subscription) -> bool {
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return false,
                event = subscription.next() => match event {
                    Some(change) => {
                        debug!(kind = ?change.kind, identity_id = %self.identity_id, "Message change");
                        self.recount().await;
                    }
                    None => {
                        warn!(identity_id = %self.identity_id, "Unread subscription closed by backend");
                        return true;
                    }
                },
            }
        }
    }

    async fn recount(&self) {
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => return,
            result = count_unread(self.backend.as_ref(), &self.identity_id) => result,
        };
        if let Some(count) = absorb(Operation::UnreadCount, result) {
            self.shared.publish(
                self.generation,
                &self.identity_id,
                count,
                self.on_change.as_ref(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use garden_backend::{MemoryBackend, MemoryOp};
    use serde_json::json;

    use super::*;

    fn counter(memory: &MemoryBackend) -> UnreadCounter {
        UnreadCounter::new(Arc::new(memory.clone()), &TrackingConfig::default())
    }

    fn recorder() -> (UnreadCallback, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: UnreadCallback = Arc::new(move |count: u64| sink.lock().unwrap().push(count));
        (callback, seen)
    }

    fn message(id: u32, recipient: &str) -> serde_json::Value {
        json!({"id": id, "recipient_id": recipient, "read": false})
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_then_one_then_zero() {
        let memory = MemoryBackend::new();
        let counter = counter(&memory);
        let (callback, seen) = recorder();

        counter.subscribe("alice", Some(callback));
        settle().await;
        assert_eq!(counter.count(), 0);

        memory.insert(tables::MESSAGES, message(1, "alice")).await.unwrap();
        settle().await;
        assert_eq!(counter.count(), 1);

        memory
            .update(
                tables::MESSAGES,
                &Filter::new().eq("id", 1),
                json!({"read": true}),
            )
            .await
            .unwrap();
        settle().await;
        assert_eq!(counter.count(), 0);

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_identity_closes_previous_subscription() {
        let memory = MemoryBackend::new();
        memory.seed(tables::MESSAGES, message(1, "bob")).await;
        memory.seed(tables::MESSAGES, message(2, "bob")).await;
        let counter = counter(&memory);
        let (alice_cb, alice_seen) = recorder();
        let (bob_cb, bob_seen) = recorder();

        counter.subscribe("alice", Some(alice_cb));
        settle().await;
        counter.subscribe("bob", Some(bob_cb));
        settle().await;

        assert_eq!(memory.active_subscriptions(tables::MESSAGES).await, 1);
        assert_eq!(counter.count(), 2);
        assert_eq!(counter.identity().as_deref(), Some("bob"));

        memory.insert(tables::MESSAGES, message(3, "alice")).await.unwrap();
        settle().await;

        assert_eq!(*alice_seen.lock().unwrap(), vec![0]);
        assert_eq!(*bob_seen.lock().unwrap(), vec![2]);
        assert_eq!(counter.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_from_cleared_scope_is_ignored() {
        let memory = MemoryBackend::new();
        memory.seed(tables::MESSAGES, message(1, "alice")).await;
        memory.set_latency(MemoryOp::Count, Duration::from_secs(5)).await;
        let counter = counter(&memory);
        let (callback, seen) = recorder();

        counter.subscribe("alice", Some(callback));
        tokio::time::sleep(Duration::from_secs(1)).await;
        counter.clear();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(counter.count(), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert!(counter.identity().is_none());
    }

    #[tokio::test]
    async fn stale_generation_cannot_publish() {
        let (count, _) = watch::channel(0);
        let shared = Shared {
            generation: Mutex::new(0),
            count,
            last_known: Mutex::new(HashMap::new()),
        };
        let old = shared.advance();
        let new = shared.advance();

        shared.publish(old, "alice", 9, None);
        assert_eq!(*shared.count.borrow(), 0);
        assert_eq!(shared.last_known("alice"), None);
        shared.publish(new, "bob", 4, None);
        assert_eq!(*shared.count.borrow(), 4);
        assert_eq!(shared.last_known("bob"), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recount_keeps_previous_count() {
        let memory = MemoryBackend::new();
        memory.seed(tables::MESSAGES, message(1, "alice")).await;
        let counter = counter(&memory);

        counter.subscribe("alice", None);
        settle().await;
        assert_eq!(counter.count(), 1);

        memory
            .fail_next(MemoryOp::Count, TrackingError::Network("offline".into()))
            .await;
        memory.insert(tables::MESSAGES, message(2, "alice")).await.unwrap();
        settle().await;
        assert_eq!(counter.count(), 1);

        memory.insert(tables::MESSAGES, message(3, "alice")).await.unwrap();
        settle().await;
        assert_eq!(counter.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_resets_and_unsubscribes() {
        let memory = MemoryBackend::new();
        memory.seed(tables::MESSAGES, message(1, "alice")).await;
        let counter = counter(&memory);
        let mut rx = counter.watch();

        counter.subscribe("alice", None);
        settle().await;
        assert_eq!(*rx.borrow_and_update(), 1);

        counter.clear();
        settle().await;
        assert_eq!(counter.count(), 0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(memory.active_subscriptions(tables::MESSAGES).await, 0);
    }

    #[tokio::test]
    async fn get_unread_count_falls_back_to_last_known() {
        let memory = MemoryBackend::new();
        memory.seed(tables::MESSAGES, message(1, "alice")).await;
        memory.seed(tables::MESSAGES, message(2, "alice")).await;
        let counter = counter(&memory);

        assert_eq!(counter.get_unread_count("alice").await, 2);

        memory
            .fail_next(MemoryOp::Count, TrackingError::Network("offline".into()))
            .await;
        assert_eq!(counter.get_unread_count("alice").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_query_never_borrows_another_identity_count() {
        let memory = MemoryBackend::new();
        memory.seed(tables::MESSAGES, message(1, "bob")).await;
        memory.seed(tables::MESSAGES, message(2, "bob")).await;
        let counter = counter(&memory);

        counter.subscribe("bob", None);
        settle().await;
        assert_eq!(counter.count(), 2);

        memory
            .fail_next(MemoryOp::Count, TrackingError::Network("offline".into()))
            .await;
        assert_eq!(counter.get_unread_count("alice").await, 0);
        assert_eq!(counter.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_subscribe_is_retried() {
        let memory = MemoryBackend::new();
        memory
            .fail_next(
                MemoryOp::Subscribe,
                TrackingError::Subscription("join timed out".into()),
            )
            .await;
        let counter = counter(&memory);

        counter.subscribe("alice", None);
        settle().await;
        assert_eq!(counter.count(), 0);
        assert_eq!(memory.active_subscriptions(tables::MESSAGES).await, 0);

        memory.insert(tables::MESSAGES, message(1, "alice")).await.unwrap();
        memory.insert(tables::MESSAGES, message(2, "alice")).await.unwrap();
        counter.subscribe("alice", None);
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(counter.count(), 2);
        assert_eq!(memory.active_subscriptions(tables::MESSAGES).await, 1);

        memory.insert(tables::MESSAGES, message(3, "alice")).await.unwrap();
        settle().await;
        assert_eq!(counter.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn feed_closed_by_backend_is_reopened() {
        let memory = MemoryBackend::new();
        let counter = counter(&memory);
        let (callback, seen) = recorder();

        counter.subscribe("alice", Some(callback));
        settle().await;
        assert_eq!(memory.drop_subscriptions(tables::MESSAGES).await, 1);
        settle().await;

        // Missed while the feed was down; picked up by the recount on reopen.
        memory.insert(tables::MESSAGES, message(1, "alice")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.count(), 1);
        assert_eq!(memory.active_subscriptions(tables::MESSAGES).await, 1);

        memory.insert(tables::MESSAGES, message(2, "alice")).await.unwrap();
        settle().await;
        assert_eq!(counter.count(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }
}
