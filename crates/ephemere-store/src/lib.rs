//! # ephemere-store
//!
//! Local on-device persistence for the ephemere client: known rooms (with
//! their secrets, tokens, and handles) and decrypted message history.
//!
//! Nothing in this crate ever reaches the server. The crate exposes a
//! synchronous [`Database`] handle that wraps a `rusqlite::Connection` and
//! provides typed CRUD helpers keyed by room hash, ordered by timestamp.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod rooms;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
