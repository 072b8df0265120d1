//! Room identity and key derivation.
//!
//! A room is addressed by an opaque 256-bit secret carried in the share
//! link. Two independent values are derived from it client-side:
//!
//! - the **room hash**, a one-way SHA-256 digest with a fixed domain prefix,
//!   safe to send to the server and to use as the pub/sub topic;
//! - the **message key**, a BLAKE3 `derive_key` output under a distinct
//!   context, so knowledge of the room hash alone never yields the key.
//!
//! Both derivations are deterministic pure functions of the secret.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::constants::{MESSAGE_KEY_CONTEXT, ROOM_HASH_DOMAIN, SECRET_SIZE};
use crate::error::SecretError;

/// 256-bit symmetric key for the message envelope codec.
pub type MessageKey = [u8; 32];

/// The capability token encoded in the share link. Possession implies
/// access; it never travels to the server.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomSecret([u8; SECRET_SIZE]);

impl RoomSecret {
    /// Generate a fresh secret from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse the base64url (unpadded) form used in share links.
    pub fn decode(encoded: &str) -> Result<Self, SecretError> {
        let bytes = base64_url_decode(encoded).map_err(|_| SecretError::InvalidEncoding)?;
        if bytes.len() != SECRET_SIZE {
            return Err(SecretError::InvalidLength {
                expected: SECRET_SIZE,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; SECRET_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Encode for embedding in a share link.
    pub fn encode(&self) -> String {
        base64_url_encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

// Keep secrets out of logs.
impl std::fmt::Debug for RoomSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RoomSecret(..)")
    }
}

/// Public room identifier: lowercase hex SHA-256 digest of the secret under
/// a fixed domain prefix. Irreversible server-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomHash(String);

impl RoomHash {
    /// Validate an externally supplied room hash (64 lowercase hex chars).
    pub fn parse(s: &str) -> Result<Self, SecretError> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(SecretError::InvalidRoomHash);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pub/sub topic for this room.
    pub fn topic(&self) -> String {
        format!("{}{}", crate::constants::TOPIC_PREFIX, self.0)
    }
}

impl std::fmt::Display for RoomHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `hex(SHA-256("cfa.room_hash" || secret))`.
pub fn derive_room_hash(secret: &RoomSecret) -> RoomHash {
    let mut hasher = Sha256::new();
    hasher.update(ROOM_HASH_DOMAIN.as_bytes());
    hasher.update(secret.as_bytes());
    RoomHash(hex::encode(hasher.finalize()))
}

/// BLAKE3 KDF under the `cfa.k_msg` context. Distinct from the room-hash
/// derivation, so the server-visible hash never yields the key.
pub fn derive_message_key(secret: &RoomSecret) -> MessageKey {
    let mut hasher = blake3::Hasher::new_derive_key(MESSAGE_KEY_CONTEXT);
    hasher.update(secret.as_bytes());
    let hash = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash.as_bytes()[..32]);
    key
}

/// Hex SHA-256 of a participant token; the only form the server persists.
pub fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

pub fn base64_url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.decode(s.trim())
}
