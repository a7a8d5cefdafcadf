//! Wire frame types for the real-time transport (spec.md §6.2).
//!
//! Client -> server commands and server -> client envelopes are framed as
//! plain JSON text messages, one per WebSocket frame.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relaykit_common::types::{Envelope, Topic};

/// Raw client -> server command, tagged on `command`.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    MarkRead { notification_id: Uuid },
    MarkAllRead,
}

/// Parsed and validated client command, topics resolved from their string form.
#[derive(Debug)]
pub enum ClientMessage {
    Subscribe(Topic),
    Unsubscribe(Topic),
    MarkRead(Uuid),
    MarkAllRead,
}

impl ClientMessage {
    pub fn from_command(raw: &str) -> Result<Self, &'static str> {
        let command: ClientCommand = serde_json::from_str(raw).map_err(|_| "invalid json command")?;
        match command {
            ClientCommand::Subscribe { topic } => topic.parse().map(ClientMessage::Subscribe),
            ClientCommand::Unsubscribe { topic } => topic.parse().map(ClientMessage::Unsubscribe),
            ClientCommand::MarkRead { notification_id } => Ok(ClientMessage::MarkRead(notification_id)),
            ClientCommand::MarkAllRead => Ok(ClientMessage::MarkAllRead),
        }
    }
}

/// Server -> client frame: `{"topic":"...","envelope":{"action":...,"entity_kind":...,"entity":...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub topic: String,
    pub envelope: WireEnvelope,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireEnvelope {
    pub action: relaykit_common::types::EnvelopeAction,
    pub entity_kind: &'static str,
    pub entity: serde_json::Value,
}

impl ServerFrame {
    pub fn from_envelope(topic: Topic, envelope: &Envelope) -> Self {
        Self {
            topic: topic.to_string(),
            envelope: WireEnvelope { action: envelope.action, entity_kind: envelope.entity_kind, entity: envelope.body.clone() },
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            topic: "error".to_string(),
            envelope: WireEnvelope {
                action: relaykit_common::types::EnvelopeAction::Update,
                entity_kind: "error",
                entity: serde_json::json!({ "message": message }),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Heartbeat ping, sent by the server every fixed interval (spec.md §6.2).
pub fn ping_json() -> &'static str {
    r#"{"topic":"heartbeat","envelope":{"action":"update","entity_kind":"ping","entity":null}}"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subscribe() {
        let msg = ClientMessage::from_command(r#"{"command":"subscribe","topic":"posts"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe(Topic::Posts)));
    }

    #[test]
    fn test_parse_mark_read() {
        let id = Uuid::now_v7();
        let raw = format!(r#"{{"command":"mark_read","notification_id":"{id}"}}"#);
        let msg = ClientMessage::from_command(&raw).unwrap();
        match msg {
            ClientMessage::MarkRead(parsed) => assert_eq!(parsed, id),
            _ => panic!("expected MarkRead"),
        }
    }

    #[test]
    fn test_parse_mark_all_read() {
        let msg = ClientMessage::from_command(r#"{"command":"mark_all_read"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::MarkAllRead));
    }

    #[test]
    fn test_subscribe_rejects_bad_topic() {
        let err = ClientMessage::from_command(r#"{"command":"subscribe","topic":"not-a-topic"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_server_frame_json() {
        let env = Envelope { action: relaykit_common::types::EnvelopeAction::New, entity_kind: "post", body: serde_json::json!({"id": "x"}) };
        let frame = ServerFrame::from_envelope(Topic::Posts, &env);
        let json = frame.to_json().unwrap();
        assert!(json.contains("\"topic\":\"posts\""));
        assert!(json.contains("\"action\":\"new\""));
    }
}
