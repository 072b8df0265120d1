//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` so it can be handed directly to a UI
//! layer.

use serde::{Deserialize, Serialize};

/// A room this device knows about, keyed by its public hash.
///
/// The secret is enough to re-derive the message key on demand; the token
/// (if present) proves admitted membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRoom {
    /// Hex room hash (primary key).
    pub room_hash: String,
    /// Base64url room secret as carried in the share link.
    pub secret: String,
    /// Participant bearer token, once admitted.
    pub token: Option<String>,
    /// Display handle chosen for this room.
    pub handle: Option<String>,
    /// When this room was first opened locally (unix seconds).
    pub created_at: i64,
}

/// Whether a message is real chat traffic or a locally generated notice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    System,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "system" => MessageKind::System,
            _ => MessageKind::Chat,
        }
    }
}

/// Incoming or outgoing, relative to this device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "out" => Direction::Out,
            _ => Direction::In,
        }
    }
}

/// A single decrypted chat message, local history only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Wire message id (primary key, also the dedup key).
    pub id: String,
    /// Room this message belongs to.
    pub room_hash: String,
    /// Unix seconds, as reported by the server event.
    pub timestamp: i64,
    /// Decrypted display text.
    pub content: String,
    pub kind: MessageKind,
    pub direction: Direction,
    /// Sender token hash, when the event was attributed.
    pub from_hash: Option<String>,
    /// Sender display handle, when carried in the plaintext.
    pub handle: Option<String>,
}
