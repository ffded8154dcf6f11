//! Player telemetry events.
//!
//! The player pushes one JSON object per WebSocket frame, tagged by `type`.
//! Only the four playback events matter here; everything else (volume,
//! repeat, shuffle, ...) decodes to [`TelemetryEvent::Unknown`].

use serde::Deserialize;

use super::types::{lenient_secs, PlayerSong};

/// A decoded telemetry frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryEvent {
    PositionChanged {
        #[serde(default, deserialize_with = "lenient_secs")]
        position: u64,
    },
    #[serde(rename_all = "camelCase")]
    PlayerInfo {
        #[serde(default)]
        is_playing: bool,
        #[serde(default, deserialize_with = "lenient_secs")]
        position: u64,
        #[serde(default)]
        song: Option<PlayerSong>,
    },
    VideoChanged {
        #[serde(default, deserialize_with = "lenient_secs")]
        position: u64,
        #[serde(default)]
        song: PlayerSong,
    },
    #[serde(rename_all = "camelCase")]
    PlayerStateChanged {
        #[serde(default)]
        is_playing: bool,
        #[serde(default, deserialize_with = "lenient_secs")]
        position: u64,
    },
    #[serde(other)]
    Unknown,
}

impl TelemetryEvent {
    /// Decodes a raw frame.
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}
