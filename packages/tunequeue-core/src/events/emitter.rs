//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than on the hub, so
//! they can be tested without subscribers and the transport can change.

use super::{ChannelStatus, QueueView};
use crate::player::types::PlayerState;
use crate::state::ConnectionStatus;

/// Trait for emitting state changes without knowledge of transport.
///
/// Implementations must not block: emitters are called from the telemetry
/// consumer and from connection tasks.
pub trait EventEmitter: Send + Sync {
    /// Emits a player state change.
    fn emit_player(&self, state: PlayerState);

    /// Emits a connection status change.
    fn emit_status(&self, status: ConnectionStatus);

    /// Emits a queue mirror change.
    fn emit_queue(&self, view: QueueView);

    /// Emits chat account information.
    fn emit_channel(&self, status: ChannelStatus);
}

/// No-op emitter for tests and headless wiring without a control panel.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_player(&self, _state: PlayerState) {}

    fn emit_status(&self, _status: ConnectionStatus) {}

    fn emit_queue(&self, _view: QueueView) {}

    fn emit_channel(&self, _status: ChannelStatus) {}
}

/// Logging emitter for debugging event flow.
///
/// Player ticks are logged at trace level since they arrive every second.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_player(&self, state: PlayerState) {
        tracing::trace!(?state, "player_event");
    }

    fn emit_status(&self, status: ConnectionStatus) {
        tracing::debug!(?status, "status_event");
    }

    fn emit_queue(&self, view: QueueView) {
        tracing::debug!(entries = view.entries.len(), "queue_event");
    }

    fn emit_channel(&self, status: ChannelStatus) {
        tracing::debug!(accounts = status.accounts.len(), "channel_event");
    }
}
