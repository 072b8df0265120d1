//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development (in-process event bus, local
//! SQLite file).

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the broker SQLite database.
    /// Env: `CHAT_DB_PATH`
    /// Default: `./data/chat.sqlite`
    pub db_path: PathBuf,

    /// Publish URL of an external Mercure-compatible hub. When unset, the
    /// server runs its in-process bus (single-node mode).
    /// Env: `MERCURE_HUB_URL`
    pub hub_url: Option<String>,

    /// HS256 key used to sign publisher capability JWTs for the hub.
    /// Env: `MERCURE_PUBLISHER_JWT_KEY`
    /// Default: `!ChangeMe!` (development only).
    pub hub_jwt_key: String,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"ephemere"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: PathBuf::from("./data/chat.sqlite"),
            hub_url: None,
            hub_jwt_key: "!ChangeMe!".to_string(),
            instance_name: "ephemere".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("CHAT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("MERCURE_HUB_URL") {
            if !url.is_empty() {
                config.hub_url = Some(url);
            }
        }

        if let Ok(key) = std::env::var("MERCURE_PUBLISHER_JWT_KEY") {
            if !key.is_empty() {
                config.hub_jwt_key = key;
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
