//! Translation of inbound Phoenix frames into [`RealtimeEvent`]s.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::change::{ChangeEvent, ChangeKind};

use super::types::{PhoenixMessage, RealtimeEvent, HEARTBEAT_TOPIC};

/// Channel name without the `realtime:` prefix the server adds.
fn channel_name(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Row change carried under `payload.data`. `None` for anything that is not
/// an insert, update or delete.
pub(crate) fn parse_postgres_change(payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data")?;
    let kind = ChangeKind::from_postgres_event(data.get("type")?.as_str()?)?;
    let field = |name: &str| data.get(name).cloned().unwrap_or(Value::Null);
    Some(ChangeEvent {
        table: data.get("table")?.as_str()?.to_string(),
        kind,
        record: field("record"),
        old_record: field("old_record"),
    })
}

fn reply_event(topic: String, payload: &Value) -> Option<RealtimeEvent> {
    let status = payload.get("status")?.as_str()?;
    if status == "ok" {
        debug!(topic = %topic, "Channel joined");
        return Some(RealtimeEvent::ChannelJoined { topic });
    }
    let message = payload
        .pointer("/response/reason")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    warn!(topic = %topic, status, reason = %message, "Channel join rejected");
    Some(RealtimeEvent::ChannelError { topic, message })
}

/// Event to surface for `msg`, if any.
pub(crate) fn interpret(msg: &PhoenixMessage) -> Option<RealtimeEvent> {
    if msg.topic == HEARTBEAT_TOPIC {
        return None;
    }
    let topic = channel_name(&msg.topic).to_string();

    match msg.event.as_str() {
        "phx_reply" => reply_event(topic, &msg.payload),
        "phx_error" | "phx_close" => {
            let message = if msg.event == "phx_error" {
                warn!(topic = %topic, "Channel errored");
                "channel error"
            } else {
                info!(topic = %topic, "Channel closed by server");
                "channel closed"
            };
            Some(RealtimeEvent::ChannelError {
                topic,
                message: message.to_string(),
            })
        }
        "postgres_changes" => {
            let Some(change) = parse_postgres_change(&msg.payload) else {
                debug!(topic = %topic, "Ignoring malformed postgres_changes payload");
                return None;
            };
            debug!(topic = %topic, table = %change.table, kind = ?change.kind, "Row change");
            Some(RealtimeEvent::PostgresChange { topic, change })
        }
        other => {
            debug!(topic = %topic, event = other, "Ignoring Phoenix event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn frame(topic: &str, event: &str, payload: Value) -> PhoenixMessage {
        PhoenixMessage {
            topic: topic.into(),
            event: event.into(),
            payload,
            msg_ref: None,
        }
    }

    #[test]
    fn parses_insert_change() {
        let payload = json!({
            "ids": [1],
            "data": {
                "type": "INSERT",
                "schema": "public",
                "table": "messages",
                "record": {"id": 7, "recipient_id": "u1"},
                "commit_timestamp": "2026-01-01T00:00:00Z"
            }
        });
        let change = parse_postgres_change(&payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.table, "messages");
        assert_eq!(change.record["id"], 7);
        assert!(change.old_record.is_null());
    }

    #[test]
    fn rejects_unknown_change_type() {
        let payload = json!({"data": {"type": "TRUNCATE", "table": "messages"}});
        assert!(parse_postgres_change(&payload).is_none());
    }

    #[test]
    fn row_changes_use_short_channel_name() {
        let msg = frame(
            "realtime:garden-messages-1",
            "postgres_changes",
            json!({"data": {"type": "UPDATE", "table": "messages", "record": {"read": true}, "old_record": {"read": false}}}),
        );
        match interpret(&msg) {
            Some(RealtimeEvent::PostgresChange { topic, change }) => {
                assert_eq!(topic, "garden-messages-1");
                assert_eq!(change.kind, ChangeKind::Update);
                assert_eq!(change.old_record["read"], false);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn rejected_join_carries_reason() {
        let msg = frame(
            "realtime:garden-messages-1",
            "phx_reply",
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
        );
        match interpret(&msg) {
            Some(RealtimeEvent::ChannelError { message, .. }) => assert_eq!(message, "unauthorized"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_replies_and_system_frames_are_dropped() {
        assert!(interpret(&frame("phoenix", "phx_reply", json!({"status": "ok"}))).is_none());
        assert!(interpret(&frame("realtime:x", "system", json!({}))).is_none());
    }
}
