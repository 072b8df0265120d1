//! Admission protocol: the knock / approve / reject handshake, plus the
//! authenticated room actions layered on the registry, presence tracker,
//! and event bus.
//!
//! Every component is constructor-injected; there is no ambient storage
//! state. State mutations commit before their event is published, and a
//! publish failure is logged and swallowed: it only delays peer
//! notification, it never rolls back or fails the request.

use std::sync::Arc;

use chrono::Utc;

use ephemere_bus::RoomBus;
use ephemere_shared::constants::TOPIC_PREFIX;
use ephemere_shared::{EncryptedPayload, EventBody, RoomEvent};

use crate::error::ServerError;
use crate::presence::PresenceTracker;
use crate::registry::{RegistryOutcome, RoomRegistry};

pub struct Admission {
    registry: Arc<RoomRegistry>,
    presence: Arc<PresenceTracker>,
    bus: RoomBus,
}

impl Admission {
    pub fn new(
        registry: Arc<RoomRegistry>,
        presence: Arc<PresenceTracker>,
        bus: RoomBus,
    ) -> Self {
        Self {
            registry,
            presence,
            bus,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// First contact with a room hash: create-and-admit, or inspect.
    pub fn register_or_inspect(
        &self,
        room_hash: &str,
    ) -> Result<RegistryOutcome, ServerError> {
        self.registry.register_or_inspect(room_hash)
    }

    /// Unauthenticated join request. Admission is social at this stage:
    /// no token required, a human participant decides.
    pub async fn knock(
        &self,
        room_hash: &str,
        message: Option<String>,
    ) -> Result<(), ServerError> {
        self.require_room(room_hash)?;

        self.publish(room_hash, None, EventBody::Knock { message })
            .await;
        self.registry.touch_room(room_hash)?;
        Ok(())
    }

    /// An existing participant admits whoever is waiting. Mints a fresh
    /// token and broadcasts it; the first un-admitted subscriber to see
    /// the event claims it.
    pub async fn approve(
        &self,
        room_hash: &str,
        token: Option<&str>,
    ) -> Result<String, ServerError> {
        self.require_room(room_hash)?;
        let approver = self.registry.require_participant(room_hash, token)?;
        self.presence.touch_hashed(room_hash, &approver)?;

        let new_token = self.registry.mint_participant(room_hash)?;
        self.publish(
            room_hash,
            Some(approver),
            EventBody::Approve {
                new_participant_token: new_token.clone(),
            },
        )
        .await;
        self.registry.touch_room(room_hash)?;
        Ok(new_token)
    }

    /// Signal waiting knockers to stop waiting. Revokes nothing.
    pub async fn reject(
        &self,
        room_hash: &str,
        token: Option<&str>,
        message: Option<String>,
    ) -> Result<(), ServerError> {
        self.require_room(room_hash)?;
        let sender = self.registry.require_participant(room_hash, token)?;
        self.presence.touch_hashed(room_hash, &sender)?;

        self.publish(room_hash, Some(sender), EventBody::Reject { message })
            .await;
        self.registry.touch_room(room_hash)?;
        Ok(())
    }

    /// Relay an encrypted chat payload. The server never inspects the
    /// ciphertext; it only attributes and fans out.
    pub async fn relay_message(
        &self,
        room_hash: &str,
        token: Option<&str>,
        msg_id: String,
        encrypted_payload: EncryptedPayload,
    ) -> Result<(), ServerError> {
        self.require_room(room_hash)?;
        let sender = self.registry.require_participant(room_hash, token)?;

        self.publish(
            room_hash,
            Some(sender.clone()),
            EventBody::Chat {
                msg_id,
                encrypted_payload,
            },
        )
        .await;
        self.presence.touch_hashed(room_hash, &sender)?;
        self.registry.touch_room(room_hash)?;
        Ok(())
    }

    /// Heartbeat: refresh the caller's presence and report how many
    /// participants are currently live.
    pub fn heartbeat(
        &self,
        room_hash: &str,
        token: Option<&str>,
    ) -> Result<i64, ServerError> {
        self.require_room(room_hash)?;
        let sender = self.registry.require_participant(room_hash, token)?;
        self.presence.touch_hashed(room_hash, &sender)?;
        self.presence.live_count(room_hash)
    }

    /// Delete the room, cascading all participants and presence, then
    /// notify every subscriber. The delete commits first. The room's
    /// topic is retired last, after the destroy event is in flight, so
    /// subscribers drain it before observing the closed stream.
    pub async fn disband(
        &self,
        room_hash: &str,
        token: Option<&str>,
    ) -> Result<(), ServerError> {
        self.require_room(room_hash)?;
        let sender = self.registry.require_participant(room_hash, token)?;

        self.registry.disband(room_hash)?;
        self.publish(room_hash, Some(sender), EventBody::Destroy {})
            .await;
        self.bus
            .retire_topic(&format!("{TOPIC_PREFIX}{room_hash}"));
        Ok(())
    }

    fn require_room(&self, room_hash: &str) -> Result<(), ServerError> {
        if self.registry.room_exists(room_hash)? {
            Ok(())
        } else {
            Err(ServerError::RoomNotFound)
        }
    }

    /// Best-effort publish; failures are logged, never propagated.
    async fn publish(&self, room_hash: &str, from: Option<String>, body: EventBody) {
        let event = RoomEvent::new(
            room_hash.to_string(),
            from,
            Utc::now().timestamp(),
            body,
        );
        if let Err(e) = self.bus.publish(&event).await {
            tracing::warn!(
                room = %event.room_hash,
                kind = event.kind(),
                error = %e,
                "event publish failed, peers will miss this notification"
            );
        }
    }
}
