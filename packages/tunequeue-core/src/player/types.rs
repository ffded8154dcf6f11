//! Typed schemas for the player's JSON payloads and the tracked player state.
//!
//! The player reports songs and queues as loosely structured JSON. Everything
//! here is defaulted so missing or unknown fields never fail a decode.

use serde::{Deserialize, Deserializer, Serialize};

/// Accepts integer, float or null second counts; negatives and NaN become 0.
pub(crate) fn lenient_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u64)
        .unwrap_or(0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracks
// ─────────────────────────────────────────────────────────────────────────────

/// A playable track. Replaced wholesale on change, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Opaque external video identifier.
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration_seconds: u64,
    pub image_url: String,
}

impl TrackInfo {
    /// `true` when no track is loaded.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

/// Song object as reported by the player (telemetry and `GET /api/v1/song`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSong {
    pub title: String,
    pub alternative_title: String,
    pub artist: String,
    pub video_id: String,
    #[serde(deserialize_with = "lenient_secs")]
    pub song_duration: u64,
    #[serde(deserialize_with = "lenient_secs")]
    pub elapsed_seconds: u64,
    pub image_src: Option<String>,
    pub is_paused: Option<bool>,
}

impl From<PlayerSong> for TrackInfo {
    fn from(song: PlayerSong) -> Self {
        let title = if song.title.is_empty() {
            song.alternative_title
        } else {
            song.title
        };
        Self {
            id: song.video_id,
            title,
            artist: song.artist,
            duration_seconds: song.song_duration,
            image_url: song.image_src.unwrap_or_default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Player State
// ─────────────────────────────────────────────────────────────────────────────

/// What the player is doing right now.
///
/// Serialized for UI subscribers as `{isPlaying, elapsedSeconds, id, title, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub is_playing: bool,
    /// Playback position in seconds.
    #[serde(rename = "elapsedSeconds")]
    pub position: u64,
    #[serde(flatten)]
    pub current_track: TrackInfo,
}

impl PlayerState {
    /// Seconds left in the current track (0 when position overshoots).
    pub fn remaining_secs(&self) -> u64 {
        self.current_track
            .duration_seconds
            .saturating_sub(self.position)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// External Queue
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct TextRuns {
    #[serde(default)]
    runs: Vec<TextRun>,
}

#[derive(Debug, Default, Deserialize)]
struct TextRun {
    #[serde(default)]
    text: String,
}

impl TextRuns {
    fn first(&self) -> String {
        self.runs.first().map(|r| r.text.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PanelVideoRenderer {
    video_id: String,
    selected: bool,
    title: TextRuns,
    #[serde(alias = "shortByLineText")]
    short_byline_text: TextRuns,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WrapperPrimary {
    playlist_panel_video_renderer: Option<PanelVideoRenderer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VideoWrapperRenderer {
    primary_renderer: WrapperPrimary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawQueueItem {
    playlist_panel_video_renderer: Option<PanelVideoRenderer>,
    playlist_panel_video_wrapper_renderer: Option<VideoWrapperRenderer>,
}

#[derive(Debug, Default, Deserialize)]
struct RawQueue {
    #[serde(default)]
    items: Vec<RawQueueItem>,
}

/// One slot of the player's queue.
///
/// Slots the player renders without a video keep their position with an
/// empty `video_id` so indices stay aligned with the player's own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub video_id: String,
    pub title: String,
    pub artist: String,
    pub selected: bool,
}

impl From<RawQueueItem> for QueueItem {
    fn from(raw: RawQueueItem) -> Self {
        let renderer = raw.playlist_panel_video_renderer.or_else(|| {
            raw.playlist_panel_video_wrapper_renderer
                .and_then(|w| w.primary_renderer.playlist_panel_video_renderer)
        });
        match renderer {
            Some(r) => Self {
                title: r.title.first(),
                artist: r.short_byline_text.first(),
                video_id: r.video_id,
                selected: r.selected,
            },
            None => Self::default(),
        }
    }
}

/// The player's queue as observed at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub items: Vec<QueueItem>,
}

impl QueueSnapshot {
    /// Decodes the player's `GET /api/v1/queue` body.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawQueue = serde_json::from_slice(body)?;
        Ok(Self {
            items: raw.items.into_iter().map(QueueItem::from).collect(),
        })
    }

    /// Index of the entry the player marks as selected (currently playing).
    pub fn selected_index(&self) -> Option<usize> {
        self.items.iter().position(|item| item.selected)
    }

    /// Id of the selected entry.
    pub fn selected_id(&self) -> Option<&str> {
        self.selected_index()
            .map(|idx| self.items[idx].video_id.as_str())
    }

    /// `true` if `video_id` is waiting somewhere after the selected entry.
    ///
    /// The selected entry itself does not count: re-requesting the track that
    /// is playing queues it again.
    pub fn is_queued_after_selected(&self, video_id: &str) -> bool {
        self.index_after_selected(video_id).is_some()
    }

    /// Index of the first occurrence of `video_id` strictly after the selected entry.
    pub fn index_after_selected(&self, video_id: &str) -> Option<usize> {
        let start = self.selected_index()? + 1;
        self.items
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, item)| item.video_id == video_id)
            .map(|(idx, _)| idx)
    }

    /// Up to `limit` entries starting at the selected one.
    pub fn upcoming(&self, limit: usize) -> &[QueueItem] {
        match self.selected_index() {
            Some(start) => {
                let end = (start + limit).min(self.items.len());
                &self.items[start..end]
            }
            None => &[],
        }
    }
}
