//! Authoritative view of what the player is doing.
//!
//! Telemetry frames arrive over a single-consumer channel and are applied
//! strictly in order. Readers take cheap copies via [`PlayerStateTracker::snapshot`].

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::queue_mirror::{MirrorAdvance, QueueMirror};
use crate::events::EventEmitter;
use crate::player::telemetry::TelemetryEvent;
use crate::player::types::{PlayerState, TrackInfo};
use crate::utils::truncate_for_log;

/// Tracks player state from telemetry and keeps the queue mirror aligned.
pub struct PlayerStateTracker {
    state: Mutex<PlayerState>,
    mirror: Arc<QueueMirror>,
    emitter: Arc<dyn EventEmitter>,
}

impl PlayerStateTracker {
    pub fn new(mirror: Arc<QueueMirror>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            state: Mutex::new(PlayerState::default()),
            mirror,
            emitter,
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> PlayerState {
        self.state.lock().clone()
    }

    /// Id of the track currently loaded (empty before the first report).
    pub fn current_track_id(&self) -> String {
        self.state.lock().current_track.id.clone()
    }

    /// Applies one raw telemetry frame.
    ///
    /// Malformed frames are logged and dropped. Frames of unrelated types are
    /// ignored.
    pub fn apply_telemetry_event(&self, raw: &[u8]) {
        let event = match TelemetryEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                log::warn!(
                    "[Tracker] Dropping malformed telemetry ({}): {}",
                    e,
                    truncate_for_log(&String::from_utf8_lossy(raw), 200)
                );
                return;
            }
        };

        let mut track_change: Option<(String, String)> = None;
        let updated = {
            let mut state = self.state.lock();
            match event {
                TelemetryEvent::PositionChanged { position } => {
                    log::trace!("[Tracker] Position {}", position);
                    state.position = position;
                }
                TelemetryEvent::PlayerInfo {
                    is_playing,
                    position,
                    song,
                } => {
                    state.is_playing = is_playing;
                    state.position = position;
                    if let Some(song) = song {
                        state.current_track = TrackInfo::from(song);
                    }
                }
                TelemetryEvent::VideoChanged { position, song } => {
                    state.position = position;
                    if song.video_id != state.current_track.id {
                        let next = TrackInfo::from(song);
                        let previous = std::mem::replace(&mut state.current_track, next);
                        track_change = Some((previous.id, state.current_track.id.clone()));
                    }
                }
                TelemetryEvent::PlayerStateChanged {
                    is_playing,
                    position,
                } => {
                    state.is_playing = is_playing;
                    state.position = position;
                }
                TelemetryEvent::Unknown => return,
            }
            state.clone()
        };

        if let Some((previous, next)) = track_change {
            log::info!(
                "[Tracker] Now playing: {} - {} ({})",
                updated.current_track.title,
                updated.current_track.artist,
                next
            );
            if self.mirror.advance(&previous, &next) == MirrorAdvance::Cleared {
                log::info!("[Tracker] Mirror desynchronized at {} -> {}", previous, next);
            }
        }

        self.emitter.emit_player(updated);
    }

    /// Consumes telemetry frames until the channel closes or `cancel` fires.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Bytes>, cancel: CancellationToken) {
        log::info!("[Tracker] Started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = rx.recv() => match frame {
                    Some(raw) => self.apply_telemetry_event(&raw),
                    None => break,
                },
            }
        }
        log::info!("[Tracker] Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::services::queue_mirror::QueueEntry;

    fn tracker() -> (Arc<PlayerStateTracker>, Arc<QueueMirror>) {
        let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
        let mirror = Arc::new(QueueMirror::new(Arc::clone(&emitter)));
        let tracker = Arc::new(PlayerStateTracker::new(Arc::clone(&mirror), emitter));
        (tracker, mirror)
    }

    fn video_changed(id: &str, duration: u64) -> Vec<u8> {
        format!(
            r#"{{"type":"VIDEO_CHANGED","position":0,"song":{{"videoId":"{}","title":"T-{}","artist":"A","songDuration":{}}}}}"#,
            id, id, duration
        )
        .into_bytes()
    }

    fn request(id: &str) -> QueueEntry {
        QueueEntry {
            requested_by: "viewer".into(),
            track: TrackInfo {
                id: id.into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn applies_player_info_and_ticks() {
        let (tracker, _) = tracker();
        tracker.apply_telemetry_event(
            br#"{"type":"PLAYER_INFO","isPlaying":true,"position":3,"song":{"videoId":"v","title":"T","artist":"A","songDuration":180}}"#,
        );
        tracker.apply_telemetry_event(br#"{"type":"POSITION_CHANGED","position":4}"#);

        let state = tracker.snapshot();
        assert!(state.is_playing);
        assert_eq!(state.position, 4);
        assert_eq!(state.current_track.id, "v");
        assert_eq!(state.remaining_secs(), 176);
    }

    #[test]
    fn malformed_and_unknown_frames_leave_state_untouched() {
        let (tracker, _) = tracker();
        tracker.apply_telemetry_event(&video_changed("abc", 200));
        let before = tracker.snapshot();

        tracker.apply_telemetry_event(b"{broken");
        tracker.apply_telemetry_event(br#"{"type":"SHUFFLE_CHANGED","shuffle":true}"#);
        tracker.apply_telemetry_event(br#"{"type":"POSITION_CHANGED","position":"soon"}"#);

        assert_eq!(tracker.snapshot(), before);
    }

    #[test]
    fn video_change_replaces_track_and_advances_mirror() {
        let (tracker, mirror) = tracker();
        tracker.apply_telemetry_event(&video_changed("x", 200));
        mirror.push(request("a"), "x");
        mirror.push(request("b"), "x");

        tracker.apply_telemetry_event(&video_changed("a", 150));
        assert_eq!(tracker.current_track_id(), "a");
        assert_eq!(mirror.head_id().as_deref(), Some("a"));

        tracker.apply_telemetry_event(&video_changed("b", 150));
        assert_eq!(mirror.head_id().as_deref(), Some("b"));
        assert_eq!(mirror.len(), 1);
    }

    #[test]
    fn repeated_video_changed_for_same_track_only_updates_position() {
        let (tracker, mirror) = tracker();
        tracker.apply_telemetry_event(&video_changed("x", 200));
        mirror.push(request("a"), "x");

        tracker.apply_telemetry_event(
            br#"{"type":"VIDEO_CHANGED","position":9,"song":{"videoId":"x"}}"#,
        );
        assert_eq!(tracker.snapshot().position, 9);
        assert_eq!(tracker.snapshot().current_track.title, "T-x");
        assert_eq!(mirror.len(), 1);
    }

    #[test]
    fn unexpected_track_wipes_mirror() {
        let (tracker, mirror) = tracker();
        tracker.apply_telemetry_event(&video_changed("x", 200));
        mirror.push(request("a"), "x");

        tracker.apply_telemetry_event(&video_changed("z", 200));
        assert!(mirror.is_empty());
    }

    #[tokio::test]
    async fn run_applies_frames_in_order() {
        let (tracker, _) = tracker();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&tracker).run(rx, cancel.clone()));

        tx.send(Bytes::from(video_changed("a", 100))).await.unwrap();
        tx.send(Bytes::from_static(br#"{"type":"POSITION_CHANGED","position":7}"#))
            .await
            .unwrap();
        tx.send(Bytes::from_static(br#"{"type":"PLAYER_STATE_CHANGED","isPlaying":true,"position":8}"#))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        let state = tracker.snapshot();
        assert_eq!(state.current_track.id, "a");
        assert_eq!(state.position, 8);
        assert!(state.is_playing);
    }
}
