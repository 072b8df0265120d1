//! # ephemere-shared
//!
//! Protocol types shared between the ephemere client and server: room
//! identity derivation, the authenticated message envelope, and the typed
//! room event union.
//!
//! Everything in this crate is pure computation over bytes; no I/O, no
//! async. The room secret and the symmetric message key never appear in any
//! server-side code path.

pub mod constants;
pub mod derive;
pub mod envelope;
pub mod events;

mod error;

pub use derive::{MessageKey, RoomHash, RoomSecret};
pub use envelope::{ChatBody, EncryptedPayload};
pub use error::{CryptoError, SecretError};
pub use events::{EventBody, RoomEvent};
