//! Fixed protocol constants and timing policy.
//!
//! Endpoint paths are defined by the external player and the chat platform and
//! must match them exactly. Timing values are defaults; most are mirrored as
//! overridable fields on [`Config`](crate::state::Config).

// ─────────────────────────────────────────────────────────────────────────────
// Application
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by `/health`.
pub const SERVICE_ID: &str = "tunequeue";

/// Default control-panel bind port.
pub const DEFAULT_BIND_PORT: u16 = 3999;

// ─────────────────────────────────────────────────────────────────────────────
// External Player API
// ─────────────────────────────────────────────────────────────────────────────

/// Default `host:port` of the player's local API.
pub const DEFAULT_PLAYER_HOST: &str = "127.0.0.1:26538";

pub const PLAYER_SONG_PATH: &str = "/api/v1/song";
pub const PLAYER_QUEUE_PATH: &str = "/api/v1/queue";
pub const PLAYER_NEXT_PATH: &str = "/api/v1/next";
pub const PLAYER_SEARCH_PATH: &str = "/api/v1/search";
pub const PLAYER_TELEMETRY_PATH: &str = "/api/v1/ws";

/// `insertPosition` value asking the player to insert right after the selected entry.
pub const INSERT_AFTER_CURRENT_VIDEO: &str = "INSERT_AFTER_CURRENT_VIDEO";

/// Timeout for every player HTTP request (seconds).
pub const PLAYER_HTTP_TIMEOUT_SECS: u64 = 10;

/// Delay before reconnecting the telemetry stream (seconds).
pub const PLAYER_RECONNECT_DELAY_SECS: u64 = 3;

/// Short-link prefix used in chat replies.
pub const YOUTU_BE_PREFIX: &str = "https://youtu.be/";

// ─────────────────────────────────────────────────────────────────────────────
// Chat platform (Twitch EventSub / Helix)
// ─────────────────────────────────────────────────────────────────────────────

pub const EVENTSUB_WS_URL: &str = "wss://eventsub.wss.twitch.tv/ws";
pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";
pub const OAUTH_VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

pub const SUB_CHAT_MESSAGE: &str = "channel.chat.message";
pub const SUB_STREAM_ONLINE: &str = "stream.online";
pub const SUB_STREAM_OFFLINE: &str = "stream.offline";
pub const SUB_REWARD_REDEMPTION: &str = "channel.channel_points_custom_reward_redemption.add";

/// Grace added on top of the session keepalive timeout before a connection is
/// considered dead (seconds).
pub const KEEPALIVE_GRACE_SECS: u64 = 5;

/// Keepalive timeout assumed until the welcome frame says otherwise (seconds).
pub const DEFAULT_KEEPALIVE_TIMEOUT_SECS: u64 = 10;

/// Delay between chat reconnect attempts (seconds).
pub const CHAT_RECONNECT_DELAY_SECS: u64 = 5;

/// Tokens expiring sooner than this are flagged at startup (days).
pub const TOKEN_EXPIRY_WARNING_DAYS: i64 = 15;

// ─────────────────────────────────────────────────────────────────────────────
// Queue synchronization
// ─────────────────────────────────────────────────────────────────────────────

/// Remaining playback time at or below which the near-end guard engages (seconds).
pub const NEAR_END_THRESHOLD_SECS: u64 = 4;

/// Extra time the near-end guard waits beyond the remaining playback (seconds).
pub const NEAR_END_BUFFER_SECS: u64 = 10;

/// Poll interval while the near-end guard waits for the track to change.
pub const NEAR_END_POLL_MS: u64 = 200;

/// Poll interval while waiting for an insert to become observable.
pub const REORDER_POLL_MS: u64 = 500;

/// Total budget for observing an insert before giving up (seconds).
pub const REORDER_TIMEOUT_SECS: u64 = 10;

/// Default minimum interval between invocations of a rate-gated command (seconds).
pub const DEFAULT_COMMAND_COOLDOWN_SECS: u64 = 10;

/// Maximum entries listed by the `!queue` reply.
pub const QUEUE_REPLY_LIMIT: usize = 6;

/// Accepted song duration range for requests (seconds).
pub const MIN_SONG_DURATION_SECS: u64 = 60;
pub const MAX_SONG_DURATION_SECS: u64 = 600;

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the telemetry channel feeding the state tracker.
pub const TELEMETRY_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the inbound chat event channel.
pub const CHAT_CHANNEL_CAPACITY: usize = 128;

/// Outbound buffer per UI subscriber. A subscriber that falls this far behind is dropped.
pub const SUBSCRIBER_BUFFER: usize = 64;
