//! Connection settings, wire envelope and event types for the realtime client.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use garden_config::schema::{BackendConfig, RealtimeSettings};

use crate::change::{ChangeEvent, ChangeKind};
use crate::filter::Filter;

/// Topic the server expects socket-level heartbeats on.
pub(crate) const HEARTBEAT_TOPIC: &str = "phoenix";

/// Where and how to open the Realtime socket.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Project URL over http(s); the socket uses the matching ws(s) scheme.
    pub base_url: String,
    pub api_key: String,
    /// User JWT forwarded in every channel join.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    /// First reconnect delay; doubles per failure up to the maximum.
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |present: bool| if present { "<set>" } else { "<unset>" };
        f.debug_struct("RealtimeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redacted(!self.api_key.is_empty()))
            .field("access_token", &redacted(self.access_token.is_some()))
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field(
                "reconnect_delay_secs",
                &(self.reconnect_delay_secs..=self.max_reconnect_delay_secs),
            )
            .finish()
    }
}

impl RealtimeConfig {
    pub fn from_settings(backend: &BackendConfig, settings: &RealtimeSettings) -> Self {
        let secs = |value: u32| u64::from(value.max(1));
        Self {
            base_url: backend.base_url(),
            api_key: backend.api_key.clone(),
            access_token: backend.access_token.clone(),
            heartbeat_interval_secs: secs(settings.heartbeat_interval_secs),
            reconnect_delay_secs: secs(settings.reconnect_delay_secs),
            max_reconnect_delay_secs: secs(settings.max_reconnect_delay_secs),
        }
    }

    pub(crate) fn ws_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let socket_base = match base.split_once("://") {
            Some(("https", host)) => format!("wss://{host}"),
            Some(("http", host)) => format!("ws://{host}"),
            _ => base.to_string(),
        };
        format!(
            "{socket_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.api_key
        )
    }
}

/// Phoenix v1 JSON frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: String, event: &str, payload: Value, msg_ref: String) -> Self {
        Self {
            topic,
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
        }
    }

    pub(crate) fn join(channel: &str, config: &ChannelConfig, msg_ref: String) -> Self {
        Self::new(
            format!("realtime:{channel}"),
            "phx_join",
            config.to_join_payload(),
            msg_ref,
        )
    }

    pub(crate) fn leave(channel: &str, msg_ref: String) -> Self {
        Self::new(format!("realtime:{channel}"), "phx_leave", json!({}), msg_ref)
    }

    pub(crate) fn heartbeat(msg_ref: String) -> Self {
        Self::new(HEARTBEAT_TOPIC.to_string(), "heartbeat", json!({}), msg_ref)
    }
}

/// A `postgres_changes` listener entry in a join payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PostgresChangesConfig {
    /// `INSERT`, `UPDATE`, `DELETE` or `*`.
    pub event: String,
    pub schema: String,
    pub table: String,
    pub filter: Option<String>,
}

/// What a channel listens to.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub postgres_changes: Vec<PostgresChangesConfig>,
    pub access_token: Option<String>,
}

impl ChannelConfig {
    /// Listen to each of `kinds` on `public.<table>`, narrowed by `filter`.
    pub fn for_table(
        table: &str,
        filter: &Filter,
        kinds: &[ChangeKind],
        access_token: Option<String>,
    ) -> Self {
        let realtime_filter = filter.to_realtime_filter();
        let postgres_changes = kinds
            .iter()
            .map(|kind| PostgresChangesConfig {
                event: kind.as_postgres_event().to_string(),
                schema: "public".to_string(),
                table: table.to_string(),
                filter: realtime_filter.clone(),
            })
            .collect();
        Self {
            postgres_changes,
            access_token,
        }
    }

    pub(crate) fn to_join_payload(&self) -> Value {
        let listeners: Vec<Value> = self
            .postgres_changes
            .iter()
            .map(|listener| {
                let mut entry = json!({
                    "event": listener.event,
                    "schema": listener.schema,
                    "table": listener.table,
                });
                if let Some(filter) = &listener.filter {
                    entry["filter"] = Value::String(filter.clone());
                }
                entry
            })
            .collect();

        let mut payload = json!({
            "config": {
                "broadcast": { "self": false, "ack": false },
                "presence": { "key": "" },
                "postgres_changes": listeners,
            }
        });
        if let Some(token) = &self.access_token {
            payload["access_token"] = Value::String(token.clone());
        }
        payload
    }
}

/// Connection and channel activity reported to the owner of the client.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    ChannelJoined { topic: String },
    /// Join rejected, or the channel errored or was closed by the server.
    ChannelError { topic: String, message: String },
    PostgresChange { topic: String, change: ChangeEvent },
    /// Connect attempt failed or timed out.
    Error(String),
}

#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    JoinChannel { topic: String, config: ChannelConfig },
    LeaveChannel { topic: String },
    Disconnect,
}
