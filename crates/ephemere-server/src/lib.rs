//! # ephemere-server
//!
//! Broker for ephemeral, link-addressed chat rooms. The server never sees
//! plaintext and stores no message history; its entire authority is room
//! existence, membership tokens, presence-based liveness, and real-time
//! event fan-out through the pub/sub hub.
//!
//! Request handling is stateless: every request runs independently against
//! the shared SQLite store, and creation races resolve through
//! per-statement atomicity ("room already exists" is a legitimate outcome
//! of a second concurrent create, not an error).

pub mod admission;
pub mod api;
pub mod config;
pub mod error;
pub mod presence;
pub mod registry;
pub mod store;

pub use api::{build_router, serve, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
