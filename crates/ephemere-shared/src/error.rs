use thiserror::Error;

/// Errors from room secret parsing and key derivation.
///
/// Any of these is fatal to a room load: a malformed secret cannot derive a
/// room hash or a message key.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SecretError {
    #[error("Invalid room secret: not base64url")]
    InvalidEncoding,

    #[error("Invalid room secret: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid room hash: expected 64 lowercase hex chars")]
    InvalidRoomHash,
}

/// Errors from the message envelope codec.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    /// AEAD tag mismatch: wrong key, tampered ciphertext, or a payload
    /// replayed outside the room/message context it was bound to.
    #[error("Authentication failed: ciphertext rejected")]
    AuthenticationFailure,

    #[error("Malformed envelope field: {0}")]
    MalformedField(&'static str),
}
