//! Application services layer.
//!
//! This module holds the queue synchronization engine: the state tracker fed
//! by player telemetry, the command dispatcher fed by chat, and the
//! synchronizer that merges requests into the player's queue.

pub mod command_dispatcher;
pub mod history;
pub mod player_state_tracker;
pub mod queue_mirror;
pub mod queue_synchronizer;
pub mod rate_gate;

pub use command_dispatcher::{CommandDispatcher, DispatcherServices};
pub use history::{HistoryRecorder, JsonlHistory, NoopHistory};
pub use player_state_tracker::PlayerStateTracker;
pub use queue_mirror::{QueueEntry, QueueMirror};
pub use queue_synchronizer::{Confirmation, PendingRequest, QueueError, QueueSynchronizer};
pub use rate_gate::RateGate;
