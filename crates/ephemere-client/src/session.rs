//! Client room session: the five-state lifecycle that composes
//! derivation, registration, admission, presence, and the envelope codec.
//!
//! ```text
//! INIT ──┬── token held / registry `created` ──► PARTICIPANT ──┐
//!        ├── exists, participants live ───────► LOBBY_WAITING ─┤
//!        └── exists, nobody live ─────────────► LOBBY_EMPTY ───┤
//!                                                              ▼
//!                                  destroy event / disband ► DESTROYED
//! ```
//!
//! Events are applied one at a time on a single logical thread; the
//! heartbeat runs as an independent task and never blocks message flow.
//! Incoming chat is applied idempotently by message id, so a client's own
//! echoed event is a no-op after the optimistic local write.
//!
//! Embedders either pump [`RoomSession::handle_event`] and
//! [`RoomSession::heartbeat`] themselves, or hand a shared session to
//! [`drive`], which runs both loops while leaving every action callable
//! through the same handle.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use ephemere_shared::constants::{HEARTBEAT_INTERVAL_SECS, MAX_HANDLE_LEN};
use ephemere_shared::derive::{
    base64_url_encode, derive_message_key, derive_room_hash, token_hash,
};
use ephemere_shared::envelope::{self, ChatBody};
use ephemere_shared::{CryptoError, EventBody, MessageKey, RoomEvent, RoomHash, RoomSecret};
use ephemere_store::{ChatMessage, Database, Direction, MessageKind, StoredRoom};

use crate::api::{RoomApi, RoomCheck};
use crate::error::ClientError;

/// Where the session is in the room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Init,
    /// Room exists with live participants; a knock can be answered.
    LobbyWaiting,
    /// Room exists but nobody is live to approve.
    LobbyEmpty,
    Participant,
    /// Terminal. All locally held tokens for the room are invalid.
    Destroyed,
}

/// UI-facing notifications emitted by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    PhaseChanged(RoomPhase),
    /// A new (non-duplicate) message was stored.
    Message(ChatMessage),
    /// Someone is knocking (participants only).
    KnockReceived { ts: i64, message: Option<String> },
    /// Our knock was turned down.
    KnockRejected { message: Option<String> },
    /// Latest live count from a heartbeat.
    ActiveParticipants(i64),
}

pub struct RoomSession {
    api: RoomApi,
    db: Database,
    room_hash: RoomHash,
    key: MessageKey,
    token: Option<String>,
    token_hash: Option<String>,
    handle: Option<String>,
    phase: RoomPhase,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl RoomSession {
    /// Open a room from its share-link secret: derive identity, restore
    /// any local membership, and register or inspect with the broker.
    pub async fn open(
        api: RoomApi,
        db: Database,
        secret: &RoomSecret,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> Result<Self, ClientError> {
        let room_hash = derive_room_hash(secret);
        let key = derive_message_key(secret);

        let existing = db.get_room(room_hash.as_str())?;
        let (token, handle, created_at) = match existing {
            Some(room) => (room.token, room.handle, room.created_at),
            None => (None, None, unix_now()),
        };
        db.upsert_room(&StoredRoom {
            room_hash: room_hash.as_str().to_string(),
            secret: secret.encode(),
            token: token.clone(),
            handle: handle.clone(),
            created_at,
        })?;

        let mut session = Self {
            api,
            db,
            room_hash,
            key,
            token_hash: token.as_deref().map(token_hash),
            token,
            handle,
            phase: RoomPhase::Init,
            updates,
        };

        if session.token.is_some() {
            // Locally held membership: straight to participant, the
            // heartbeat loop will confirm or evict us.
            session.set_phase(RoomPhase::Participant);
            return Ok(session);
        }

        match session.api.register_room(session.room_hash.as_str()).await? {
            RoomCheck::Created { participant_token } => {
                session.adopt_token(participant_token)?;
                session.set_phase(RoomPhase::Participant);
            }
            RoomCheck::Exists { has_participants } => {
                session.set_phase(if has_participants {
                    RoomPhase::LobbyWaiting
                } else {
                    RoomPhase::LobbyEmpty
                });
            }
        }
        Ok(session)
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn room_hash(&self) -> &RoomHash {
        &self.room_hash
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Local decrypted history for this room, oldest first.
    pub fn history(&self) -> Result<Vec<ChatMessage>, ClientError> {
        Ok(self.db.messages_for_room(self.room_hash.as_str())?)
    }

    /// Set the display handle carried inside future encrypted messages.
    /// A blank handle clears it.
    pub fn set_handle(&mut self, handle: &str) -> Result<(), ClientError> {
        let handle: String = handle.trim().chars().take(MAX_HANDLE_LEN).collect();
        if handle.is_empty() {
            self.db.set_room_handle(self.room_hash.as_str(), None)?;
            self.handle = None;
            return Ok(());
        }
        self.db
            .set_room_handle(self.room_hash.as_str(), Some(&handle))?;
        self.handle = Some(handle);
        Ok(())
    }

    // ── event stream ───────────────────────────────────────────────────

    /// Apply one event from the room's subscription. Events for other
    /// rooms are ignored (stale-response guard); a corrupt chat message
    /// is dropped without affecting the rest of the stream.
    pub fn handle_event(&mut self, event: RoomEvent) -> Result<(), ClientError> {
        if self.phase == RoomPhase::Destroyed {
            return Ok(());
        }
        if event.room_hash != self.room_hash.as_str() {
            debug!(got = %event.room_hash, "ignoring event for another room");
            return Ok(());
        }

        match event.body {
            EventBody::Knock { message } => {
                if self.phase == RoomPhase::Participant {
                    self.emit(SessionUpdate::KnockReceived {
                        ts: event.ts,
                        message,
                    });
                }
                Ok(())
            }
            EventBody::Approve {
                new_participant_token,
            } => {
                // Broadcast grant: the first waiter without a token claims
                // it. Participants (including the approver) ignore it.
                if self.token.is_none() {
                    self.adopt_token(new_participant_token)?;
                    self.set_phase(RoomPhase::Participant);
                }
                Ok(())
            }
            EventBody::Reject { message } => {
                if self.phase == RoomPhase::LobbyWaiting {
                    self.emit(SessionUpdate::KnockRejected { message });
                }
                Ok(())
            }
            EventBody::Destroy {} => {
                self.discard_membership()?;
                Ok(())
            }
            EventBody::Chat {
                msg_id,
                encrypted_payload,
            } => self.apply_chat(msg_id, event.from, event.ts, &encrypted_payload),
        }
    }

    fn apply_chat(
        &mut self,
        msg_id: String,
        from: Option<String>,
        ts: i64,
        payload: &ephemere_shared::EncryptedPayload,
    ) -> Result<(), ClientError> {
        let plaintext =
            match envelope::decrypt(&self.key, &self.room_hash, "chat", &msg_id, payload) {
                Ok(bytes) => bytes,
                Err(CryptoError::AuthenticationFailure) => {
                    // Foreign or tampered ciphertext; drop this message,
                    // keep the stream alive.
                    warn!(room = %self.room_hash, msg_id, "dropping unauthenticated message");
                    return Ok(());
                }
                Err(e) => {
                    warn!(room = %self.room_hash, msg_id, error = %e, "dropping malformed message");
                    return Ok(());
                }
            };

        let body = ChatBody::parse(&String::from_utf8_lossy(&plaintext));
        let direction = if from.is_some() && from == self.token_hash {
            Direction::Out
        } else {
            Direction::In
        };
        let message = ChatMessage {
            id: msg_id,
            room_hash: self.room_hash.as_str().to_string(),
            timestamp: ts,
            content: body.text,
            kind: MessageKind::Chat,
            direction,
            from_hash: from,
            handle: body.handle,
        };

        // Idempotent apply: our own echo (or any duplicate) is a no-op.
        if self.db.put_message(&message)? {
            self.emit(SessionUpdate::Message(message));
        }
        Ok(())
    }

    // ── actions ────────────────────────────────────────────────────────

    /// Ask to be let in. Unauthenticated; approval is up to the humans
    /// already inside.
    pub async fn knock(&mut self, message: Option<&str>) -> Result<(), ClientError> {
        match self.api.knock(self.room_hash.as_str(), message).await {
            Ok(()) => Ok(()),
            Err(ClientError::RoomGone) => {
                self.discard_membership()?;
                Err(ClientError::RoomGone)
            }
            Err(e) => Err(e),
        }
    }

    /// Approve the pending knocker. The new token is broadcast; our copy
    /// of it is not retained.
    pub async fn approve(&mut self) -> Result<(), ClientError> {
        let token = self.require_token()?;
        match self.api.approve(self.room_hash.as_str(), &token).await {
            Ok(_new_token) => Ok(()),
            Err(e) => Err(self.map_action_error(e)),
        }
    }

    pub async fn reject(&mut self, message: Option<&str>) -> Result<(), ClientError> {
        let token = self.require_token()?;
        match self
            .api
            .reject(self.room_hash.as_str(), &token, message)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.map_action_error(e)),
        }
    }

    /// Encrypt and send a chat message, and store the optimistic local
    /// copy. Returns the message id.
    pub async fn send_message(&mut self, text: &str) -> Result<String, ClientError> {
        let token = self.require_token()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let mut id_bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut id_bytes);
        let msg_id = base64_url_encode(&id_bytes);

        let body = ChatBody {
            text: text.to_string(),
            handle: self.handle.clone(),
        };
        let payload = envelope::encrypt(
            &self.key,
            &self.room_hash,
            "chat",
            &msg_id,
            body.to_json().as_bytes(),
        )?;

        match self
            .api
            .send_message(self.room_hash.as_str(), &token, &msg_id, &payload)
            .await
        {
            Ok(()) => {}
            Err(e) => return Err(self.map_action_error(e)),
        }

        let message = ChatMessage {
            id: msg_id.clone(),
            room_hash: self.room_hash.as_str().to_string(),
            timestamp: unix_now(),
            content: body.text,
            kind: MessageKind::Chat,
            direction: Direction::Out,
            from_hash: self.token_hash.clone(),
            handle: body.handle,
        };
        if self.db.put_message(&message)? {
            self.emit(SessionUpdate::Message(message));
        }
        Ok(msg_id)
    }

    /// One presence beat. Run every 20 seconds while a participant.
    pub async fn heartbeat(&mut self) -> Result<(), ClientError> {
        if self.phase != RoomPhase::Participant {
            return Ok(());
        }
        let token = self.require_token()?;
        match self.api.presence(self.room_hash.as_str(), &token).await {
            Ok(count) => {
                self.emit(SessionUpdate::ActiveParticipants(count));
                Ok(())
            }
            Err(e) => Err(self.map_action_error(e)),
        }
    }

    /// Tear the room down for everyone.
    pub async fn disband(&mut self) -> Result<(), ClientError> {
        let token = self.require_token()?;
        match self.api.disband(self.room_hash.as_str(), &token).await {
            Ok(()) | Err(ClientError::RoomGone) => self.discard_membership(),
            Err(e) => Err(e),
        }
    }

    // ── internals ──────────────────────────────────────────────────────

    fn adopt_token(&mut self, token: String) -> Result<(), ClientError> {
        self.db
            .set_room_token(self.room_hash.as_str(), Some(&token))?;
        self.token_hash = Some(token_hash(&token));
        self.token = Some(token);
        Ok(())
    }

    fn require_token(&self) -> Result<String, ClientError> {
        self.token.clone().ok_or(ClientError::NotParticipant)
    }

    /// The room is gone for good: drop the local row (history cascades)
    /// along with the now-worthless token.
    fn discard_membership(&mut self) -> Result<(), ClientError> {
        self.db.delete_room(self.room_hash.as_str())?;
        self.token = None;
        self.token_hash = None;
        self.set_phase(RoomPhase::Destroyed);
        Ok(())
    }

    /// Shared mapping for authenticated actions: a vanished room or a
    /// dead token both end the session.
    fn map_action_error(&mut self, e: ClientError) -> ClientError {
        if matches!(e, ClientError::RoomGone | ClientError::Unauthorized) {
            warn!(room = %self.room_hash, error = %e, "discarding membership");
            if let Err(db_err) = self.discard_membership() {
                warn!(room = %self.room_hash, error = %db_err, "failed to clear local membership");
            }
        }
        e
    }

    fn set_phase(&mut self, phase: RoomPhase) {
        if self.phase != phase {
            debug!(room = %self.room_hash, ?phase, "phase transition");
            self.phase = phase;
            self.emit(SessionUpdate::PhaseChanged(phase));
        }
    }

    fn emit(&self, update: SessionUpdate) {
        // A closed update channel means no UI is listening; that is fine.
        let _ = self.updates.send(update);
    }
}

/// Drive a shared session to completion: apply events from the
/// subscription channel in order, and heartbeat on an independent timer
/// that never blocks event application. Actions (`send_message`,
/// `approve`, ...) stay available to the embedder through the same
/// handle. Returns when the room is destroyed or the transport channel
/// closes (reconnection is the transport's job and does not change
/// state).
pub async fn drive(session: Arc<Mutex<RoomSession>>, mut events: mpsc::Receiver<RoomEvent>) {
    let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&session)));

    while let Some(event) = events.recv().await {
        let mut locked = session.lock().await;
        if let Err(e) = locked.handle_event(event) {
            warn!(room = %locked.room_hash, error = %e, "failed to apply event");
        }
        if locked.phase == RoomPhase::Destroyed {
            break;
        }
    }
    heartbeat.abort();
}

async fn heartbeat_loop(session: Arc<Mutex<RoomSession>>) {
    let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !heartbeat_once(&session).await {
            return;
        }
    }
}

/// One beat against the broker. The session lock is held only to
/// snapshot the call inputs and to apply the outcome, never across the
/// network await. Returns `false` once the session is finished.
async fn heartbeat_once(session: &Mutex<RoomSession>) -> bool {
    let (api, room_hash, token) = {
        let locked = session.lock().await;
        match locked.phase {
            RoomPhase::Destroyed => return false,
            RoomPhase::Participant => {}
            _ => return true,
        }
        let Some(token) = locked.token.clone() else {
            return true;
        };
        (locked.api.clone(), locked.room_hash.clone(), token)
    };

    match api.presence(room_hash.as_str(), &token).await {
        Ok(count) => {
            session
                .lock()
                .await
                .emit(SessionUpdate::ActiveParticipants(count));
            true
        }
        Err(e @ (ClientError::RoomGone | ClientError::Unauthorized)) => {
            let _ = session.lock().await.map_action_error(e);
            false
        }
        Err(e) => {
            warn!(room = %room_hash, error = %e, "heartbeat failed");
            true
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
