//! # ephemere-server binary
//!
//! Broker for ephemeral, link-addressed, end-to-end encrypted chat rooms:
//! - **Room registry** over SQLite (room hashes and participant token
//!   hashes only -- no plaintext, no message history)
//! - **Presence tracking** with a lazy 45-second liveness window
//! - **Admission handshake** (knock / approve / reject / disband)
//! - **Event fan-out** through an in-process bus or an external
//!   Mercure-compatible hub

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ephemere_bus::{LocalBus, MercureBus, RoomBus};
use ephemere_server::admission::Admission;
use ephemere_server::api::{self, AppState};
use ephemere_server::config::ServerConfig;
use ephemere_server::presence::PresenceTracker;
use ephemere_server::registry::RoomRegistry;
use ephemere_server::store::ServerStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (respects RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ephemere_server=debug")),
        )
        .init();

    info!("Starting ephemere server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // Open the broker store.
    let store = Arc::new(
        ServerStore::open_at(&config.db_path)
            .map_err(|e| anyhow::anyhow!("failed to open store: {e}"))?,
    );

    // Pick the event bus backend.
    let bus = match config.hub_url {
        Some(ref url) => {
            info!(hub = %url, "publishing events to external hub");
            RoomBus::Mercure(MercureBus::new(url.clone(), config.hub_jwt_key.clone()))
        }
        None => {
            info!("no hub configured, using in-process event bus");
            RoomBus::Local(LocalBus::new())
        }
    };

    // Wire the components; storage is passed in explicitly, never ambient.
    let registry = Arc::new(RoomRegistry::new(store.clone()));
    let presence = Arc::new(PresenceTracker::new(store));
    let admission = Arc::new(Admission::new(registry, presence, bus));

    let app_state = AppState {
        admission,
        config: Arc::new(config.clone()),
    };

    // Run the HTTP API server until shutdown.
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
