//! Event system for real-time control-panel updates.
//!
//! This module provides:
//! - [`EventEmitter`] trait for services to emit events
//! - [`BroadcastHub`], the non-blocking fan-out to UI subscribers
//! - [`HubEventBridge`], which connects the two
//! - Event types pushed over the control-panel WebSocket

mod bridge;
mod emitter;
mod hub;

pub use bridge::HubEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};
pub use hub::{BroadcastHub, Subscription};

use serde::Serialize;

use crate::chat::credentials::AccountInfo;
use crate::player::types::PlayerState;
use crate::services::queue_mirror::QueueEntry;
use crate::state::ConnectionStatus;

/// Events pushed to UI subscribers.
///
/// Serialized as `{"type": "PLAYER_STATE", "payload": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastEvent {
    /// Full state, sent once to every new subscriber before anything else.
    Snapshot(Snapshot),

    /// Playback position, playing flag or current track changed.
    PlayerState(PlayerState),

    /// An external connection came up or went down.
    ConnectionStatus(ConnectionStatus),

    /// The local queue mirror changed.
    QueueUpdated(QueueView),

    /// Chat account information changed (login, token expiry).
    ChannelStatus(ChannelStatus),
}

/// Complete state for a newly connected subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub player: PlayerState,
    pub status: ConnectionStatus,
    pub queue: QueueView,
    pub channel: ChannelStatus,
}

/// The requests this process has queued and believes are still upcoming.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueView {
    pub entries: Vec<QueueEntry>,
}

/// Chat-side account details shown in the control panel.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub accounts: Vec<AccountInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<String>,
}

impl From<PlayerState> for BroadcastEvent {
    fn from(state: PlayerState) -> Self {
        BroadcastEvent::PlayerState(state)
    }
}

impl From<ConnectionStatus> for BroadcastEvent {
    fn from(status: ConnectionStatus) -> Self {
        BroadcastEvent::ConnectionStatus(status)
    }
}

impl From<QueueView> for BroadcastEvent {
    fn from(view: QueueView) -> Self {
        BroadcastEvent::QueueUpdated(view)
    }
}

impl From<ChannelStatus> for BroadcastEvent {
    fn from(status: ChannelStatus) -> Self {
        BroadcastEvent::ChannelStatus(status)
    }
}
