//! Typed room events.
//!
//! The wire unit published to a room's topic. Events are ephemeral: never
//! persisted server-side, consumed at most once per subscriber, no replay
//! log. Bodies are a tagged union decoded by the `type` discriminant.

use serde::{Deserialize, Serialize};

use crate::constants::EVENT_VERSION;
use crate::envelope::EncryptedPayload;

/// A single event on a room topic.
///
/// `from` carries the acting participant's token hash, or `None` for
/// unauthenticated actions (knocks). `ts` is unix seconds, set by the
/// server at publish time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEvent {
    pub v: u8,
    pub room_hash: String,
    pub from: Option<String>,
    pub ts: i64,
    #[serde(flatten)]
    pub body: EventBody,
}

/// Per-type event bodies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum EventBody {
    /// An encrypted chat message relayed verbatim; the server never sees
    /// the plaintext.
    Chat {
        msg_id: String,
        encrypted_payload: EncryptedPayload,
    },
    /// Unauthenticated request to join, awaiting human approval.
    Knock {
        #[serde(default)]
        message: Option<String>,
    },
    /// Admission grant. Every lobby subscriber sees this; the first waiter
    /// without a token claims it.
    Approve { new_participant_token: String },
    /// Signals waiting knockers to stop waiting. Revokes nothing.
    Reject {
        #[serde(default)]
        message: Option<String>,
    },
    /// The room and every token in it are gone, permanently.
    Destroy {},
}

impl RoomEvent {
    pub fn new(room_hash: String, from: Option<String>, ts: i64, body: EventBody) -> Self {
        Self {
            v: EVENT_VERSION,
            room_hash,
            from,
            ts,
            body,
        }
    }

    /// The `type` discriminant as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self.body {
            EventBody::Chat { .. } => "chat",
            EventBody::Knock { .. } => "knock",
            EventBody::Approve { .. } => "approve",
            EventBody::Reject { .. } => "reject",
            EventBody::Destroy {} => "destroy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knock_wire_shape() {
        let event = RoomEvent::new(
            "a".repeat(64),
            None,
            1700000000,
            EventBody::Knock {
                message: Some("hi".into()),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["v"], 0);
        assert_eq!(json["type"], "knock");
        assert_eq!(json["body"]["message"], "hi");
        assert_eq!(json["from"], serde_json::Value::Null);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = RoomEvent::new(
            "b".repeat(64),
            Some("deadbeef".into()),
            1700000001,
            EventBody::Approve {
                new_participant_token: "tok".into(),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: RoomEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "approve");
    }

    #[test]
    fn test_decode_by_discriminant() {
        let json = r#"{
            "v": 0,
            "room_hash": "h",
            "from": null,
            "ts": 1,
            "type": "reject",
            "body": {"message": null}
        }"#;
        let event: RoomEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event.body, EventBody::Reject { message: None }));
    }

    #[test]
    fn test_destroy_empty_body() {
        let event = RoomEvent::new("h".into(), Some("f".into()), 2, EventBody::Destroy {});
        let json = serde_json::to_string(&event).unwrap();
        let back: RoomEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.body, EventBody::Destroy {}));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"v":0,"room_hash":"h","from":null,"ts":1,"type":"poke","body":{}}"#;
        assert!(serde_json::from_str::<RoomEvent>(json).is_err());
    }
}
