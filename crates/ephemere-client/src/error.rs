use thiserror::Error;

use ephemere_shared::{CryptoError, SecretError};
use ephemere_store::StoreError;

/// Errors surfaced to the embedding application.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The share-link secret is malformed; fatal to the room load.
    #[error("Invalid room secret: {0}")]
    Secret(#[from] SecretError),

    /// Missing or invalid participant token; the current action is dead,
    /// the session must re-derive or discard its membership.
    #[error("Not authorized for this room")]
    Unauthorized,

    /// The room no longer exists (disbanded concurrently); the session
    /// transitions to `Destroyed`.
    #[error("Room no longer exists")]
    RoomGone,

    /// The action requires a participant token the session does not hold.
    #[error("Not a participant in this room")]
    NotParticipant,

    /// Refused to encrypt and relay a blank message.
    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Server returned unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("Transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),
}
