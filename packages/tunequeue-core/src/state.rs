//! Configuration and shared connection state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    CHAT_RECONNECT_DELAY_SECS, DEFAULT_BIND_PORT, DEFAULT_COMMAND_COOLDOWN_SECS,
    DEFAULT_PLAYER_HOST, MAX_SONG_DURATION_SECS, MIN_SONG_DURATION_SECS, NEAR_END_BUFFER_SECS,
    NEAR_END_POLL_MS, NEAR_END_THRESHOLD_SECS, PLAYER_RECONNECT_DELAY_SECS, QUEUE_REPLY_LIMIT,
    REORDER_POLL_MS, REORDER_TIMEOUT_SECS, SUBSCRIBER_BUFFER,
};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Timing policy for the queue synchronizer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncTiming {
    /// Remaining seconds at or below which inserts wait for the track to change.
    pub near_end_threshold_secs: u64,
    /// Extra wait budget on top of the remaining playback time.
    pub near_end_buffer_secs: u64,
    /// Poll interval of the near-end guard (milliseconds).
    pub near_end_poll_ms: u64,
    /// Poll interval while waiting for an insert to show up (milliseconds).
    pub reorder_poll_ms: u64,
    /// Budget for an insert to show up before asking for a manual fix.
    pub reorder_timeout_secs: u64,
}

impl SyncTiming {
    pub fn near_end_poll(&self) -> Duration {
        Duration::from_millis(self.near_end_poll_ms)
    }

    pub fn reorder_poll(&self) -> Duration {
        Duration::from_millis(self.reorder_poll_ms)
    }

    pub fn reorder_timeout(&self) -> Duration {
        Duration::from_secs(self.reorder_timeout_secs)
    }

    /// Guard budget for a track with `remaining_secs` left to play.
    pub fn near_end_budget(&self, remaining_secs: u64) -> Duration {
        Duration::from_secs(remaining_secs + self.near_end_buffer_secs)
    }
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            near_end_threshold_secs: NEAR_END_THRESHOLD_SECS,
            near_end_buffer_secs: NEAR_END_BUFFER_SECS,
            near_end_poll_ms: NEAR_END_POLL_MS,
            reorder_poll_ms: REORDER_POLL_MS,
            reorder_timeout_secs: REORDER_TIMEOUT_SECS,
        }
    }
}

/// Per-command cooldowns in seconds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CommandCooldowns {
    pub skip_secs: u64,
    pub song_secs: u64,
    pub queue_secs: u64,
}

impl Default for CommandCooldowns {
    fn default() -> Self {
        Self {
            skip_secs: DEFAULT_COMMAND_COOLDOWN_SECS,
            song_secs: DEFAULT_COMMAND_COOLDOWN_SECS,
            queue_secs: DEFAULT_COMMAND_COOLDOWN_SECS,
        }
    }
}

/// Configuration for the Tunequeue core.
///
/// All fields have defaults; the server binary overlays YAML and environment
/// values on top.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Port for the control-panel HTTP/WS server.
    pub preferred_port: u16,

    // Player
    /// `host:port` of the player's local API.
    pub player_host: String,
    /// Delay between telemetry reconnect attempts (seconds).
    pub player_reconnect_delay_secs: u64,

    // Chat
    /// Application client id sent with every Helix request.
    pub client_id: String,
    /// Channel-point reward that counts as a song request.
    pub reward_id: Option<String>,
    /// Delay between chat reconnect attempts (seconds).
    pub chat_reconnect_delay_secs: u64,

    // Commands
    pub cooldowns: CommandCooldowns,
    /// Maximum entries listed by the `!queue` reply.
    pub queue_reply_limit: usize,
    /// Shortest accepted song (seconds).
    pub min_song_duration_secs: u64,
    /// Longest accepted song (seconds).
    pub max_song_duration_secs: u64,

    // Queue sync
    pub sync: SyncTiming,

    // Broadcast
    /// Outbound buffer per UI subscriber.
    pub subscriber_buffer: usize,

    // Persistence
    /// Directory for the request history file. History is disabled when unset.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.player_host.trim().is_empty() {
            return Err("player_host must not be empty".to_string());
        }
        if self.subscriber_buffer == 0 {
            return Err(
                "subscriber_buffer must be >= 1 (mpsc::channel panics on 0)".to_string(),
            );
        }
        if self.queue_reply_limit == 0 {
            return Err("queue_reply_limit must be >= 1".to_string());
        }
        if self.sync.near_end_poll_ms == 0 || self.sync.reorder_poll_ms == 0 {
            return Err("poll intervals must be >= 1ms".to_string());
        }
        if self.sync.reorder_timeout_secs == 0 {
            return Err("reorder_timeout_secs must be >= 1".to_string());
        }
        if self.chat_reconnect_delay_secs == 0 || self.player_reconnect_delay_secs == 0 {
            return Err("reconnect delays must be >= 1s".to_string());
        }
        if self.min_song_duration_secs > self.max_song_duration_secs {
            return Err(format!(
                "min_song_duration_secs ({}) exceeds max_song_duration_secs ({})",
                self.min_song_duration_secs, self.max_song_duration_secs
            ));
        }
        Ok(())
    }

    pub fn chat_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.chat_reconnect_delay_secs)
    }

    pub fn player_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.player_reconnect_delay_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: DEFAULT_BIND_PORT,
            player_host: DEFAULT_PLAYER_HOST.to_string(),
            player_reconnect_delay_secs: PLAYER_RECONNECT_DELAY_SECS,
            client_id: String::new(),
            reward_id: None,
            chat_reconnect_delay_secs: CHAT_RECONNECT_DELAY_SECS,
            cooldowns: CommandCooldowns::default(),
            queue_reply_limit: QUEUE_REPLY_LIMIT,
            min_song_duration_secs: MIN_SONG_DURATION_SECS,
            max_song_duration_secs: MAX_SONG_DURATION_SECS,
            sync: SyncTiming::default(),
            subscriber_buffer: SUBSCRIBER_BUFFER,
            data_dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of every external connection, as pushed to UI subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub frontend_connected: bool,
    pub player_connected: bool,
    pub chat_connected: bool,
    pub bot_connected: bool,
    pub stream_online: bool,
}

/// Lock-free connection flags shared between the connection tasks.
///
/// Setters return `true` when the value actually changed so callers only
/// publish real transitions.
#[derive(Debug, Default)]
pub struct ConnectionState {
    frontends: AtomicUsize,
    player: AtomicBool,
    chat: AtomicBool,
    bot: AtomicBool,
    stream_online: AtomicBool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_player_connected(&self, connected: bool) -> bool {
        self.player.swap(connected, Ordering::SeqCst) != connected
    }

    pub fn set_chat_connected(&self, connected: bool) -> bool {
        self.chat.swap(connected, Ordering::SeqCst) != connected
    }

    pub fn set_bot_connected(&self, connected: bool) -> bool {
        self.bot.swap(connected, Ordering::SeqCst) != connected
    }

    pub fn set_stream_online(&self, online: bool) -> bool {
        self.stream_online.swap(online, Ordering::SeqCst) != online
    }

    pub fn stream_online(&self) -> bool {
        self.stream_online.load(Ordering::SeqCst)
    }

    pub fn player_connected(&self) -> bool {
        self.player.load(Ordering::SeqCst)
    }

    /// Records a UI subscriber joining. Returns `true` on the first one.
    pub fn frontend_joined(&self) -> bool {
        self.frontends.fetch_add(1, Ordering::SeqCst) == 0
    }

    /// Records a UI subscriber leaving. Returns `true` when none remain.
    pub fn frontend_left(&self) -> bool {
        let previous = self
            .frontends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        previous == 1
    }

    pub fn snapshot(&self) -> ConnectionStatus {
        ConnectionStatus {
            frontend_connected: self.frontends.load(Ordering::SeqCst) > 0,
            player_connected: self.player.load(Ordering::SeqCst),
            chat_connected: self.chat.load(Ordering::SeqCst),
            bot_connected: self.bot.load(Ordering::SeqCst),
            stream_online: self.stream_online.load(Ordering::SeqCst),
        }
    }
}
