//! Tunequeue Server - headless song-request service.
//!
//! Connects chat to a running music player: viewers request songs with
//! `!sr`, and the requests are merged into the player's queue in order.
//! A control panel can follow along over `/api/v1/ws`.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use tunequeue_core::{bootstrap_services, start_server, AppState, CredentialStore};
use tokio::signal;

use crate::config::ServerConfig;

/// Tunequeue Server - chat song requests into a running music player.
#[derive(Parser, Debug)]
#[command(name = "tunequeue-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TUNEQUEUE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "TUNEQUEUE_BIND_PORT")]
    port: Option<u16>,

    /// Player API `host:port` (overrides config file).
    #[arg(long, env = "TUNEQUEUE_PLAYER_HOST")]
    player_host: Option<String>,

    /// Data directory for the request history.
    #[arg(short = 'd', long, env = "TUNEQUEUE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Tunequeue Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(host) = args.player_host {
        config.player_host = host;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    log::info!(
        "Configuration: bind_port={}, player_host={}",
        config.bind_port,
        config.player_host
    );

    let credentials = Arc::new(config.credentials());
    if credentials.token(tunequeue_core::Identity::Main).is_none() {
        log::warn!("No broadcaster token configured (TUNEQUEUE_TWITCH_TOKEN); chat is disabled");
    }

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config, credentials as Arc<dyn CredentialStore>)
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    services.start_background_tasks();

    // Build app state for the HTTP server
    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;

    // Abort the server task; every subscriber has already been closed
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
