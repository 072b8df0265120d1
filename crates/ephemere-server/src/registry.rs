//! Room registry: the server's authority over room existence and
//! participant tokens.
//!
//! Trust-on-first-use is a deliberate invariant, not an oversight: the
//! first caller to observe a non-existent room hash creates it and is
//! auto-admitted as its sole initial authority. Everyone after that needs
//! explicit approval from an existing participant.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;

use ephemere_shared::constants::TOKEN_SIZE;
use ephemere_shared::derive::{base64_url_encode, token_hash};

use crate::error::ServerError;
use crate::store::ServerStore;

/// Result of [`RoomRegistry::register_or_inspect`].
#[derive(Debug)]
pub enum RegistryOutcome {
    /// The caller created the room and is its first participant. The raw
    /// token is returned exactly once and never stored recoverably.
    Created { participant_token: String },
    /// The room already exists; admission must go through knock/approve.
    Exists { has_participants: bool },
}

pub struct RoomRegistry {
    store: Arc<ServerStore>,
}

impl RoomRegistry {
    pub fn new(store: Arc<ServerStore>) -> Self {
        Self { store }
    }

    /// Atomically create-or-inspect a room.
    ///
    /// A concurrent second create loses the `INSERT OR IGNORE` race and
    /// falls through to the `Exists` path; that is a legitimate outcome.
    pub fn register_or_inspect(
        &self,
        room_hash: &str,
    ) -> Result<RegistryOutcome, ServerError> {
        let now = Utc::now().timestamp();

        if self.store.insert_room(room_hash, now)? {
            let token = self.mint_participant(room_hash)?;
            // Seed presence so the creator counts as live immediately.
            self.store
                .upsert_presence(&token_hash(&token), room_hash, now)?;
            tracing::info!(room = %room_hash, "room created, first participant admitted");
            return Ok(RegistryOutcome::Created {
                participant_token: token,
            });
        }

        let live = self.live_participants(room_hash)?;
        Ok(RegistryOutcome::Exists {
            has_participants: live > 0,
        })
    }

    pub fn room_exists(&self, room_hash: &str) -> Result<bool, ServerError> {
        self.store.room_exists(room_hash)
    }

    pub fn touch_room(&self, room_hash: &str) -> Result<(), ServerError> {
        self.store.touch_room(room_hash, Utc::now().timestamp())
    }

    /// Mint a fresh bearer token for a room. Only `sha256(token)` is
    /// persisted; the raw token goes back to the caller once.
    pub fn mint_participant(&self, room_hash: &str) -> Result<String, ServerError> {
        let mut bytes = [0u8; TOKEN_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = base64_url_encode(&bytes);

        self.store
            .insert_participant(&token_hash(&token), room_hash, Utc::now().timestamp())?;
        Ok(token)
    }

    /// Validate a bearer token against the room. Returns the token hash
    /// for event attribution. Plain hash-equality lookup; timing reveals
    /// only membership, never the token.
    pub fn require_participant(
        &self,
        room_hash: &str,
        token: Option<&str>,
    ) -> Result<String, ServerError> {
        let token = token.ok_or(ServerError::MissingToken)?;
        let hash = token_hash(token);
        if self.store.participant_in_room(&hash, room_hash)? {
            Ok(hash)
        } else {
            Err(ServerError::InvalidToken)
        }
    }

    /// Delete the room; cascades remove all participants and presence.
    /// Idempotent from the registry's perspective.
    pub fn disband(&self, room_hash: &str) -> Result<(), ServerError> {
        let deleted = self.store.delete_room(room_hash)?;
        if deleted {
            tracing::info!(room = %room_hash, "room disbanded");
        }
        Ok(())
    }

    fn live_participants(&self, room_hash: &str) -> Result<i64, ServerError> {
        let cutoff =
            Utc::now().timestamp() - ephemere_shared::constants::LIVENESS_WINDOW_SECS;
        self.store.purge_and_count_presence(room_hash, cutoff)
    }
}
