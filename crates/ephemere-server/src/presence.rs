//! Presence tracking with a rolling 45-second liveness window.
//!
//! No persistent connections and no background sweep: every heartbeat or
//! authenticated action upserts a `last_seen`, and each liveness query
//! first purges expired rows, then counts. "Room is active" is a derived,
//! eventually-accurate property.

use std::sync::Arc;

use chrono::Utc;

use ephemere_shared::constants::LIVENESS_WINDOW_SECS;
use ephemere_shared::derive::token_hash;

use crate::error::ServerError;
use crate::store::ServerStore;

pub struct PresenceTracker {
    store: Arc<ServerStore>,
}

impl PresenceTracker {
    pub fn new(store: Arc<ServerStore>) -> Self {
        Self { store }
    }

    /// Record a heartbeat (or any authenticated action) for a token.
    pub fn touch(&self, room_hash: &str, token: &str) -> Result<(), ServerError> {
        self.store
            .upsert_presence(&token_hash(token), room_hash, Utc::now().timestamp())
    }

    /// Same, for callers that already hold the token hash.
    pub fn touch_hashed(&self, room_hash: &str, hash: &str) -> Result<(), ServerError> {
        self.store
            .upsert_presence(hash, room_hash, Utc::now().timestamp())
    }

    /// Purge-then-count as one unit against the store.
    pub fn live_count(&self, room_hash: &str) -> Result<i64, ServerError> {
        self.live_count_at(room_hash, Utc::now().timestamp())
    }

    /// Clock-injected variant; tests drive the window edge cases with it.
    pub fn live_count_at(&self, room_hash: &str, now: i64) -> Result<i64, ServerError> {
        self.store
            .purge_and_count_presence(room_hash, now - LIVENESS_WINDOW_SECS)
    }
}
