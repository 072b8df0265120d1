//! # ephemere-bus
//!
//! Thin adapter over the pub/sub hub that fans room events out to
//! subscribers. One topic per room (`room:{room_hash}`); events are typed,
//! JSON-bodied, and ephemeral.
//!
//! Two backends:
//! - [`LocalBus`]: an in-process broadcast hub. Used by tests and
//!   single-node deployments where clients subscribe directly.
//! - [`MercureBus`]: publishes to an external Mercure-compatible hub over
//!   HTTP, authenticated with an HS256-signed capability JWT scoped to the
//!   target topic. Subscription then happens against the hub's own SSE
//!   endpoint, outside this crate.
//!
//! Publishing is best-effort. The server commits its state mutation first
//! and only then publishes; a publish failure delays peer notification but
//! never rolls anything back.

pub mod local;
pub mod mercure;

use thiserror::Error;

use ephemere_shared::RoomEvent;

pub use local::LocalBus;
pub use mercure::MercureBus;

/// Errors from the bus adapter. Callers log these; they never propagate
/// into request handling.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Hub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hub rejected publish: status {0}")]
    Rejected(u16),

    #[error("Event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A publish-capable handle to the configured hub backend.
#[derive(Clone)]
pub enum RoomBus {
    Local(LocalBus),
    Mercure(MercureBus),
}

impl RoomBus {
    /// Publish an event to its room's topic.
    pub async fn publish(&self, event: &RoomEvent) -> Result<(), BusError> {
        match self {
            RoomBus::Local(bus) => {
                bus.publish(event);
                Ok(())
            }
            RoomBus::Mercure(bus) => bus.publish(event).await,
        }
    }

    /// Tear down a room's topic once the room is gone. Only meaningful
    /// for the in-process hub; an external hub manages its own topics.
    pub fn retire_topic(&self, topic: &str) {
        if let RoomBus::Local(bus) = self {
            bus.drop_topic(topic);
        }
    }
}
