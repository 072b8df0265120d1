/// Room event wire version.
pub const EVENT_VERSION: u8 = 0;

/// Envelope wire version.
pub const ENVELOPE_VERSION: u8 = 0;

/// Envelope algorithm identifier (ChaCha20-Poly1305, 96-bit nonce).
pub const ENVELOPE_ALG: &str = "C20P";

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Symmetric message key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Room secret size in bytes (decoded).
pub const SECRET_SIZE: usize = 32;

/// Participant token entropy in bytes (encoded base64url on the wire).
pub const TOKEN_SIZE: usize = 32;

/// Domain-separation prefix hashed with the secret to produce the room hash.
pub const ROOM_HASH_DOMAIN: &str = "cfa.room_hash";

/// BLAKE3 derive_key context for the symmetric message key.
pub const MESSAGE_KEY_CONTEXT: &str = "cfa.k_msg";

/// Rolling liveness window: a participant with no heartbeat within this span
/// is considered offline.
pub const LIVENESS_WINDOW_SECS: i64 = 45;

/// Client heartbeat cadence. Two missed beats still fit inside the window.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 20;

/// Dedicated bearer-token request header. Never a cookie, never a query
/// parameter.
pub const TOKEN_HEADER: &str = "x-chat-token";

/// Pub/sub topic prefix; the full topic is `room:{room_hash}`.
pub const TOPIC_PREFIX: &str = "room:";

/// Maximum length of a per-room display handle.
pub const MAX_HANDLE_LEN: usize = 24;
