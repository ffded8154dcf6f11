//! HTTP/WebSocket API layer for the control panel.
//!
//! This module contains thin handlers that read from services.
//! It provides the router construction and server startup functionality.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::bootstrap::BootstrappedServices;
use crate::chat::CredentialStore;
use crate::events::{BroadcastHub, ChannelStatus, EventEmitter, Snapshot};
use crate::player::PlayerApi;
use crate::services::{PlayerStateTracker, QueueMirror};
use crate::state::{Config, ConnectionState};

pub mod http;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// Holds references to services only; handlers never mutate the player.
#[derive(Clone)]
pub struct AppState {
    /// Read-through access to the player for `/player/current`.
    pub player: Arc<dyn PlayerApi>,
    pub tracker: Arc<PlayerStateTracker>,
    pub mirror: Arc<QueueMirror>,
    pub connection: Arc<ConnectionState>,
    pub credentials: Arc<dyn CredentialStore>,
    /// Fan-out to control-panel WebSocket subscribers.
    pub hub: Arc<BroadcastHub>,
    /// Used to announce frontend connect/disconnect.
    pub emitter: Arc<dyn EventEmitter>,
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    /// Creates the API state from bootstrapped services.
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<Config>>) -> Self {
        Self {
            player: Arc::clone(&services.player),
            tracker: Arc::clone(&services.tracker),
            mirror: Arc::clone(&services.mirror),
            connection: Arc::clone(&services.connection),
            credentials: Arc::clone(&services.credentials),
            hub: Arc::clone(services.event_bridge.hub()),
            emitter: services.emitter(),
            config,
        }
    }

    /// Current state of everything a control panel shows.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            player: self.tracker.snapshot(),
            status: self.connection.snapshot(),
            queue: self.mirror.view(),
            channel: self.channel_status(),
        }
    }

    pub fn channel_status(&self) -> ChannelStatus {
        ChannelStatus {
            accounts: self.credentials.accounts(),
            reward_id: self.config.read().reward_id.clone(),
        }
    }
}

/// Starts the HTTP server on the configured port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let port = state.config.read().preferred_port;
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server listening on http://{}", listener.local_addr()?);
    let app = http::create_router(state);

    axum::serve(listener, app).await?;
    Ok(())
}
