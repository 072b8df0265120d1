//! # ephemere-client
//!
//! Protocol client for ephemeral, link-addressed, end-to-end encrypted
//! chat rooms. The crate drives the full room lifecycle:
//!
//! 1. derive the room hash and message key from the share-link secret
//!    (the secret never leaves the device);
//! 2. register or inspect the room with the broker;
//! 3. if not yet admitted, knock and wait for an `approve` event;
//! 4. as a participant, heartbeat every 20 seconds, send and receive
//!    encrypted messages, and approve or reject knockers.
//!
//! Events arrive over a plain channel; the pub/sub transport that fills
//! it (SSE, in-process bus, ...) is outside this crate. UI-facing changes
//! flow out through a [`session::SessionUpdate`] channel.

pub mod api;
pub mod session;

mod error;

pub use api::{RoomApi, RoomCheck};
pub use error::ClientError;
pub use session::{drive, RoomPhase, RoomSession, SessionUpdate};
