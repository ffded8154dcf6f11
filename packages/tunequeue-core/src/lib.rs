//! Tunequeue Core - chat-driven song requests merged into a live player queue.
//!
//! Viewers request songs in chat; the requests land, in order, in the queue of
//! an external music player that is already playing, while control-panel
//! subscribers receive live player and connection state.
//!
//! # Architecture
//!
//! - [`player`]: External player API client and its telemetry feed
//! - [`chat`]: Chat platform event stream, REST client and credentials
//! - [`search`]: Turning a `!sr` query into a single track
//! - [`services`]: State tracker, command dispatcher and queue synchronizer
//! - [`events`]: Broadcast hub for control-panel subscribers
//! - [`api`]: HTTP/WebSocket surface for the control panel
//! - [`bootstrap`]: Composition root
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`PlayerApi`](player::PlayerApi): The external player
//! - [`ChatReplier`](chat::ChatReplier): Sending chat replies
//! - [`CredentialStore`](chat::CredentialStore): Chat tokens and accounts
//! - [`SearchProvider`](search::SearchProvider): Song lookup
//! - [`EventEmitter`](events::EventEmitter): Emitting state changes
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod chat;
pub mod error;
pub mod events;
pub mod player;
pub mod protocol_constants;
pub mod runtime;
pub mod search;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{ErrorCode, ErrorKind, TunequeueError, TunequeueResult};
pub use events::{BroadcastEvent, BroadcastHub, EventEmitter, HubEventBridge};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{CommandCooldowns, Config, ConnectionStatus, SyncTiming};

// Re-export chat types
pub use chat::{CredentialStore, Identity, InMemoryCredentialStore};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
