//! Local, best-effort mirror of the requests this process has queued.
//!
//! The mirror holds requested tracks in play order. Its head is either the
//! request that is currently playing or the next one due. Whenever the player
//! moves to a track the mirror did not expect, the mirror is cleared: a wrong
//! view is worse than an empty one.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::events::{EventEmitter, QueueView};
use crate::player::types::TrackInfo;

/// A request accepted into the player's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Chat login of the requester.
    pub requested_by: String,
    pub track: TrackInfo,
}

/// What a track change did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAdvance {
    /// Nothing to do: the mirror was empty.
    Empty,
    /// The head still lines up with the new track.
    Kept,
    /// The finished request was removed and the next one lines up.
    Popped,
    /// The mirror no longer matched the player and was cleared.
    Cleared,
}

/// The queue mirror. All access goes through one lock, never held across I/O.
pub struct QueueMirror {
    entries: Mutex<VecDeque<QueueEntry>>,
    emitter: Arc<dyn EventEmitter>,
}

impl QueueMirror {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            emitter,
        }
    }

    /// Appends an accepted request.
    ///
    /// Returns how many requests were already waiting ahead of it, not
    /// counting a head entry that is the track playing now (`current_id`).
    pub fn push(&self, entry: QueueEntry, current_id: &str) -> usize {
        let view = {
            let mut entries = self.entries.lock();
            let ahead = entries.len() - usize::from(Self::head_is_playing(&entries, current_id));
            entries.push_back(entry);
            (ahead, Self::view_of(&entries))
        };
        self.emitter.emit_queue(view.1);
        view.0
    }

    /// `true` if a request for `video_id` is still waiting to play.
    ///
    /// A head entry that is the track playing now (`current_id`) is not
    /// waiting.
    pub fn is_waiting(&self, video_id: &str, current_id: &str) -> bool {
        let entries = self.entries.lock();
        let skip = usize::from(Self::head_is_playing(&entries, current_id));
        entries
            .iter()
            .skip(skip)
            .any(|entry| entry.track.id == video_id)
    }

    /// Applies an observed track change from `previous_id` to `new_id`.
    pub fn advance(&self, previous_id: &str, new_id: &str) -> MirrorAdvance {
        let (outcome, view) = {
            let mut entries = self.entries.lock();
            let mut popped = false;
            if entries
                .front()
                .is_some_and(|head| head.track.id == previous_id)
            {
                entries.pop_front();
                popped = true;
            }

            let head_matches = entries.front().map(|head| head.track.id == new_id);
            let outcome = match (head_matches, popped) {
                (None, false) => return MirrorAdvance::Empty,
                (Some(true), false) => return MirrorAdvance::Kept,
                (None, true) | (Some(true), true) => MirrorAdvance::Popped,
                (Some(false), _) => {
                    entries.clear();
                    MirrorAdvance::Cleared
                }
            };
            (outcome, Self::view_of(&entries))
        };

        if outcome == MirrorAdvance::Cleared {
            log::warn!("[Mirror] Queue was wiped because it was out of sync with the player");
        }
        self.emitter.emit_queue(view);
        outcome
    }

    /// Copy of the mirrored entries, head first.
    pub fn view(&self) -> QueueView {
        Self::view_of(&self.entries.lock())
    }

    /// Id of the head entry.
    #[cfg(test)]
    pub(crate) fn head_id(&self) -> Option<String> {
        self.entries.lock().front().map(|e| e.track.id.clone())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn head_is_playing(entries: &VecDeque<QueueEntry>, current_id: &str) -> bool {
        entries
            .front()
            .is_some_and(|head| !current_id.is_empty() && head.track.id == current_id)
    }

    fn view_of(entries: &VecDeque<QueueEntry>) -> QueueView {
        QueueView {
            entries: entries.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;

    fn entry(id: &str) -> QueueEntry {
        QueueEntry {
            requested_by: "viewer".into(),
            track: TrackInfo {
                id: id.into(),
                ..Default::default()
            },
        }
    }

    fn mirror() -> QueueMirror {
        QueueMirror::new(Arc::new(NoopEventEmitter))
    }

    #[test]
    fn push_counts_requests_ahead() {
        let m = mirror();
        assert_eq!(m.push(entry("a"), "x"), 0);
        assert_eq!(m.push(entry("b"), "x"), 1);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn push_skips_playing_head() {
        let m = mirror();
        m.push(entry("a"), "x");
        m.advance("x", "a");
        // "a" is now playing, so nothing is waiting ahead of "b".
        assert_eq!(m.push(entry("b"), "a"), 0);
    }

    #[test]
    fn requests_play_through_in_order() {
        let m = mirror();
        m.push(entry("a"), "x");
        m.push(entry("b"), "x");

        assert_eq!(m.advance("x", "a"), MirrorAdvance::Kept);
        assert_eq!(m.head_id().as_deref(), Some("a"));
        assert_eq!(m.advance("a", "b"), MirrorAdvance::Popped);
        assert_eq!(m.head_id().as_deref(), Some("b"));
        assert_eq!(m.advance("b", "y"), MirrorAdvance::Popped);
        assert!(m.is_empty());
    }

    #[test]
    fn unexpected_track_clears() {
        let m = mirror();
        m.push(entry("a"), "x");
        m.push(entry("b"), "x");
        assert_eq!(m.advance("x", "z"), MirrorAdvance::Cleared);
        assert!(m.is_empty());
    }

    #[test]
    fn jump_past_head_clears() {
        let m = mirror();
        m.push(entry("a"), "x");
        m.push(entry("b"), "x");
        m.push(entry("c"), "x");
        m.advance("x", "a");
        // Skipping straight from "a" to "c" leaves "b" at the head.
        assert_eq!(m.advance("a", "c"), MirrorAdvance::Cleared);
        assert!(m.is_empty());
    }

    #[test]
    fn empty_mirror_stays_empty() {
        let m = mirror();
        assert_eq!(m.advance("x", "y"), MirrorAdvance::Empty);
    }

    #[test]
    fn head_matches_current_or_mirror_is_empty() {
        let changes = [("x", "a"), ("a", "b"), ("b", "c"), ("c", "d"), ("d", "a")];
        for pushes in 0..4 {
            let m = mirror();
            for id in ["a", "b", "c"].iter().take(pushes) {
                m.push(entry(id), "x");
            }
            for (prev, next) in changes {
                m.advance(prev, next);
                if let Some(head) = m.head_id() {
                    assert_eq!(head, next);
                }
            }
        }
    }

    #[test]
    fn playing_head_is_not_waiting() {
        let m = mirror();
        m.push(entry("a"), "x");
        m.push(entry("b"), "x");
        assert!(m.is_waiting("a", "x"));
        assert!(!m.is_waiting("c", "x"));

        m.advance("x", "a");
        assert!(!m.is_waiting("a", "a"));
        assert!(m.is_waiting("b", "a"));
    }
}
