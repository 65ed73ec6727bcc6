//! Routes realtime row changes to per-subscription channels.
//!
//! One WebSocket connection carries every subscription; each subscription
//! joins its own channel topic. A router task fans incoming changes out to
//! the matching [`Subscription`], and a closer task leaves the channel when
//! the handle is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::change::{ChangeEvent, ChangeKind, Subscription};
use crate::filter::Filter;
use crate::realtime::{ChannelConfig, RealtimeClient, RealtimeConfig, RealtimeEvent};

const SUBSCRIPTION_BUFFER: usize = 64;

struct Route {
    filter: Filter,
    sender: mpsc::Sender<ChangeEvent>,
}

type Routes = Arc<RwLock<HashMap<String, Route>>>;

pub(crate) struct ChangeRouter {
    client: RealtimeClient,
    routes: Routes,
    closer_tx: mpsc::UnboundedSender<String>,
    access_token: Option<String>,
    next_id: AtomicU64,
}

impl ChangeRouter {
    /// Connect to Realtime and start the router and closer tasks.
    pub(crate) fn start(config: RealtimeConfig) -> Self {
        let access_token = config.access_token.clone();
        let (client, event_rx) = RealtimeClient::connect(config);
        let routes: Routes = Arc::new(RwLock::new(HashMap::new()));
        let (closer_tx, closer_rx) = mpsc::unbounded_channel();

        tokio::spawn(route_events(event_rx, Arc::clone(&routes)));
        tokio::spawn(close_channels(closer_rx, client.clone(), Arc::clone(&routes)));

        Self {
            client,
            routes,
            closer_tx,
            access_token,
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) async fn open(
        &self,
        table: &str,
        filter: &Filter,
        kinds: &[ChangeKind],
    ) -> Subscription {
        let topic = format!(
            "garden-{table}-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.routes.write().await.insert(
            topic.clone(),
            Route {
                filter: filter.clone(),
                sender,
            },
        );

        let config = ChannelConfig::for_table(table, filter, kinds, self.access_token.clone());
        self.client.join_channel(&topic, config).await;
        debug!(topic = %topic, table, "Realtime subscription opened");

        Subscription::new(topic, receiver, Some(self.closer_tx.clone()))
    }

    pub(crate) async fn shutdown(&self) {
        self.client.disconnect().await;
    }
}

async fn route_events(mut event_rx: mpsc::Receiver<RealtimeEvent>, routes: Routes) {
    while let Some(event) = event_rx.recv().await {
        match event {
            RealtimeEvent::PostgresChange { topic, change } => {
                let routes = routes.read().await;
                let Some(route) = routes.get(&topic) else {
                    debug!(topic = %topic, "Change for unknown topic");
                    continue;
                };
                // Realtime filters on one column only; re-check the rest here.
                if !route.filter.matches(&change.record) && !route.filter.matches(&change.old_record)
                {
                    continue;
                }
                if route.sender.try_send(change).is_err() {
                    warn!(topic = %topic, "Change event dropped: subscriber not keeping up");
                }
            }
            RealtimeEvent::ChannelJoined { topic } => {
                debug!(topic = %topic, "Subscription channel joined");
            }
            RealtimeEvent::ChannelError { topic, message } => {
                // Dropping the sender ends the subscriber's feed so it can
                // resubscribe; its handle still leaves the channel on drop.
                if routes.write().await.remove(&topic).is_some() {
                    warn!(topic = %topic, message = %message, "Subscription channel failed, ending feed");
                } else {
                    debug!(topic = %topic, message = %message, "Channel error for unknown topic");
                }
            }
            RealtimeEvent::Connected => info!("Realtime connected"),
            RealtimeEvent::Disconnected => info!("Realtime disconnected"),
            RealtimeEvent::Error(message) => warn!(message = %message, "Realtime error"),
        }
    }
}

async fn close_channels(
    mut closer_rx: mpsc::UnboundedReceiver<String>,
    client: RealtimeClient,
    routes: Routes,
) {
    while let Some(topic) = closer_rx.recv().await {
        routes.write().await.remove(&topic);
        client.leave_channel(&topic).await;
        debug!(topic = %topic, "Realtime subscription closed");
    }
}
