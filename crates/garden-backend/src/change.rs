//! Row change notifications and the subscription handle that delivers them.

use serde_json::Value;
use tokio::sync::mpsc;

/// Kind of row change a subscription listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// The Postgres event name used by Realtime.
    pub fn as_postgres_event(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn from_postgres_event(event: &str) -> Option<Self> {
        match event {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One change to one row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// The row after the change (`null` for deletes).
    pub record: Value,
    /// The row before the change, when the backend provides it.
    pub old_record: Value,
}

/// A live change feed.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) closes
/// the feed on the backend side; no further events are delivered.
pub struct Subscription {
    id: String,
    events: mpsc::Receiver<ChangeEvent>,
    closer: Option<mpsc::UnboundedSender<String>>,
}

impl Subscription {
    /// `closer` receives the subscription id when the handle goes away.
    pub fn new(
        id: String,
        events: mpsc::Receiver<ChangeEvent>,
        closer: Option<mpsc::UnboundedSender<String>>,
    ) -> Self {
        Self { id, events, closer }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next change. `None` once the backend side has gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Close the feed explicitly.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.events.close();
        if let Some(closer) = self.closer.take() {
            let _ = closer.send(self.id.clone());
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
