//! Authenticated message envelope.
//!
//! Every chat payload crossing the network is AEAD-encrypted with the
//! room's message key and bound to its exact context through the AAD:
//!
//! ```text
//! AAD = UTF8(room_hash) || UTF8(msg_type) || UTF8(msg_id)
//! ```
//!
//! concatenated without delimiters (room_hash is fixed-length hex, so the
//! concatenation is unambiguous). Decryption recomputes the AAD from the
//! caller-supplied context instead of trusting the field embedded in the
//! payload; a ciphertext captured in one room or under one message id
//! cannot be replayed as valid in another.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::{ENVELOPE_ALG, ENVELOPE_VERSION, NONCE_SIZE};
use crate::derive::{base64_url_decode, base64_url_encode, MessageKey, RoomHash};
use crate::error::CryptoError;

/// The only chat content the server ever sees. All binary fields are
/// base64url-encoded, unpadded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub v: u8,
    pub alg: String,
    pub nonce: String,
    pub aad: String,
    pub ct: String,
}

fn build_aad(room_hash: &RoomHash, msg_type: &str, msg_id: &str) -> Vec<u8> {
    let mut aad =
        Vec::with_capacity(room_hash.as_str().len() + msg_type.len() + msg_id.len());
    aad.extend_from_slice(room_hash.as_str().as_bytes());
    aad.extend_from_slice(msg_type.as_bytes());
    aad.extend_from_slice(msg_id.as_bytes());
    aad
}

/// Encrypt `plaintext` bound to the given room/message context.
///
/// A fresh 12-byte nonce is drawn from the OS RNG per message; nonce reuse
/// under the same key is bounded only by the birthday limit, acceptable at
/// expected room lifetimes.
pub fn encrypt(
    key: &MessageKey,
    room_hash: &RoomHash,
    msg_type: &str,
    msg_id: &str,
    plaintext: &[u8],
) -> Result<EncryptedPayload, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = build_aad(room_hash, msg_type, msg_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedPayload {
        v: ENVELOPE_VERSION,
        alg: ENVELOPE_ALG.to_string(),
        nonce: base64_url_encode(&nonce_bytes),
        aad: base64_url_encode(&aad),
        ct: base64_url_encode(&ciphertext),
    })
}

/// Decrypt a payload under the caller's context. The `aad` field inside the
/// payload is deliberately ignored.
pub fn decrypt(
    key: &MessageKey,
    room_hash: &RoomHash,
    msg_type: &str,
    msg_id: &str,
    payload: &EncryptedPayload,
) -> Result<Vec<u8>, CryptoError> {
    let nonce_bytes =
        base64_url_decode(&payload.nonce).map_err(|_| CryptoError::MalformedField("nonce"))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::MalformedField("nonce"));
    }
    let ciphertext =
        base64_url_decode(&payload.ct).map_err(|_| CryptoError::MalformedField("ct"))?;

    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce = Nonce::from_slice(&nonce_bytes);
    let aad = build_aad(room_hash, msg_type, msg_id);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// Structured chat plaintext: the message text plus the sender's optional
/// per-room display handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatBody {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

impl ChatBody {
    /// Two-path decode: try the structured `{text, handle?}` record first,
    /// fall back to treating the whole plaintext as raw display text.
    pub fn parse(plaintext: &str) -> Self {
        if plaintext.trim_start().starts_with('{') {
            if let Ok(body) = serde_json::from_str::<ChatBody>(plaintext) {
                return body;
            }
        }
        Self {
            text: plaintext.to_string(),
            handle: None,
        }
    }

    pub fn to_json(&self) -> String {
        // Serialization of two plain fields cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| self.text.clone())
    }
}
