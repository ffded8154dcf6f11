//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Background loops are only
//! spawned by [`BootstrappedServices::start_background_tasks`], so a
//! bootstrapped set of services can be inspected before anything connects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::{
    ChatReplier, ChatSupervisor, CredentialStore, EventStreamClient, HelixClient, HelixReplier,
    Identity,
};
use crate::error::{TunequeueError, TunequeueResult};
use crate::events::{BroadcastHub, EventEmitter, HubEventBridge, LoggingEventEmitter};
use crate::player::{PlayerApi, PlayerClient, TelemetryStream};
use crate::protocol_constants::{
    CHAT_CHANNEL_CAPACITY, PLAYER_HTTP_TIMEOUT_SECS, TELEMETRY_CHANNEL_CAPACITY,
};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::search::{PlayerSearchProvider, SearchProvider};
use crate::services::{
    CommandDispatcher, DispatcherServices, HistoryRecorder, JsonlHistory, NoopHistory,
    PlayerStateTracker, QueueMirror, QueueSynchronizer,
};
use crate::state::{Config, ConnectionState};

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the API state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// External player API (HTTP).
    pub player: Arc<dyn PlayerApi>,
    /// Authoritative view of what is playing.
    pub tracker: Arc<PlayerStateTracker>,
    /// Requests this process queued and believes are upcoming.
    pub mirror: Arc<QueueMirror>,
    /// Serialized insert/reorder pipeline.
    pub synchronizer: Arc<QueueSynchronizer>,
    /// Routes chat commands.
    pub dispatcher: Arc<CommandDispatcher>,
    /// Chat tokens and validated accounts.
    pub credentials: Arc<dyn CredentialStore>,
    /// Connection flags shared by every connection task.
    pub connection: Arc<ConnectionState>,
    /// Event bridge for emitting events to control-panel subscribers.
    pub event_bridge: Arc<HubEventBridge>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    player_client: PlayerClient,
    helix: HelixClient,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
    config: Config,
    started: Arc<AtomicBool>,
}

impl BootstrappedServices {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// The event bridge as a plain emitter.
    pub fn emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::clone(&self.event_bridge) as Arc<dyn EventEmitter>
    }

    /// Spawns the telemetry stream, the tracker consumer, one chat
    /// supervisor per identity and the command dispatcher.
    ///
    /// Only the first call has an effect.
    pub fn start_background_tasks(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("[Bootstrap] Background tasks already started");
            return;
        }

        let (telemetry_tx, telemetry_rx) = mpsc::channel(TELEMETRY_CHANNEL_CAPACITY);
        let (chat_tx, chat_rx) = mpsc::channel(CHAT_CHANNEL_CAPACITY);

        let telemetry = TelemetryStream::new(
            self.player_client.telemetry_url(),
            self.config.player_reconnect_delay(),
            Arc::clone(&self.connection),
            self.emitter(),
        );
        self.spawner
            .spawn(telemetry.run(telemetry_tx, self.cancel_token.clone()));

        self.spawner.spawn(
            Arc::clone(&self.tracker).run(telemetry_rx, self.cancel_token.clone()),
        );

        for identity in [Identity::Main, Identity::Bot] {
            let supervisor = self.chat_supervisor(identity);
            self.spawner
                .spawn(supervisor.run(chat_tx.clone(), self.cancel_token.clone()));
        }
        drop(chat_tx);

        self.spawner.spawn(
            Arc::clone(&self.dispatcher).run(chat_rx, self.cancel_token.clone()),
        );

        log::info!("[Bootstrap] Background tasks started");
    }

    fn chat_supervisor(&self, identity: Identity) -> ChatSupervisor {
        let client = EventStreamClient::new(
            identity,
            self.helix.clone(),
            Arc::clone(&self.connection),
            self.emitter(),
        );
        ChatSupervisor::new(
            client,
            self.helix.clone(),
            Arc::clone(&self.credentials),
            self.emitter(),
            self.config.reward_id.clone(),
            self.config.chat_reconnect_delay(),
        )
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        let closed = self.event_bridge.hub().close_all();
        log::info!("[Bootstrap] Closed {} control-panel connection(s)", closed);

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for player and chat API calls.
fn create_http_client() -> TunequeueResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(PLAYER_HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| TunequeueError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps all application services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Shared infrastructure (HTTP client, hub, cancellation token)
/// 2. Player client, queue mirror and state tracker
/// 3. Chat API client and replier
/// 4. Queue synchronizer (depends on player, tracker, mirror, replier)
/// 5. Command dispatcher (depends on all of the above)
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`TunequeueError::Configuration`] for an invalid `config`.
pub fn bootstrap_services(
    config: &Config,
    credentials: Arc<dyn CredentialStore>,
) -> TunequeueResult<BootstrappedServices> {
    config.validate().map_err(TunequeueError::Configuration)?;

    let spawner = TokioSpawner::current();
    let http_client = create_http_client()?;
    let cancel_token = CancellationToken::new();

    let hub = Arc::new(BroadcastHub::new(config.subscriber_buffer));
    let event_bridge = Arc::new(HubEventBridge::new(hub));
    if log::log_enabled!(log::Level::Trace) {
        event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    }
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;
    let connection = Arc::new(ConnectionState::new());

    let player_client = PlayerClient::new(http_client.clone(), config.player_host.clone());
    let player: Arc<dyn PlayerApi> = Arc::new(player_client.clone());

    let mirror = Arc::new(QueueMirror::new(Arc::clone(&emitter)));
    let tracker = Arc::new(PlayerStateTracker::new(
        Arc::clone(&mirror),
        Arc::clone(&emitter),
    ));

    let helix = HelixClient::new(http_client.clone(), config.client_id.clone());
    let replier: Arc<dyn ChatReplier> =
        Arc::new(HelixReplier::new(helix.clone(), Arc::clone(&credentials)));

    let history: Arc<dyn HistoryRecorder> = match &config.data_dir {
        Some(dir) => {
            let history = JsonlHistory::in_dir(dir);
            log::info!("[Bootstrap] Request history: {}", history.path().display());
            Arc::new(history)
        }
        None => {
            log::info!("[Bootstrap] No data directory configured - request history disabled");
            Arc::new(NoopHistory)
        }
    };

    let synchronizer = Arc::new(
        QueueSynchronizer::new(
            Arc::clone(&player),
            Arc::clone(&tracker),
            Arc::clone(&mirror),
            Arc::clone(&replier),
            history,
            spawner.clone(),
            config.sync.clone(),
        )
        .with_cancel_token(cancel_token.clone()),
    );

    let search: Arc<dyn SearchProvider> = Arc::new(PlayerSearchProvider::new(
        player_client.clone(),
        config.min_song_duration_secs,
        config.max_song_duration_secs,
    ));

    let dispatcher = Arc::new(CommandDispatcher::new(
        DispatcherServices {
            player: Arc::clone(&player),
            tracker: Arc::clone(&tracker),
            search,
            synchronizer: Arc::clone(&synchronizer),
            replier,
            connection: Arc::clone(&connection),
            emitter,
            spawner: spawner.clone(),
        },
        config,
    ));

    Ok(BootstrappedServices {
        player,
        tracker,
        mirror,
        synchronizer,
        dispatcher,
        credentials,
        connection,
        event_bridge,
        spawner,
        cancel_token,
        player_client,
        helix,
        http_client,
        config: config.clone(),
        started: Arc::new(AtomicBool::new(false)),
    })
}
