//! Merges accepted song requests into the player's live queue.
//!
//! The player owns the queue and keeps changing it underneath us: tracks
//! finish, moderators skip, the broadcaster drags entries around. A submission
//! therefore runs as a fixed pipeline:
//!
//! 1. duplicate check against the player queue and the local mirror
//! 2. near-end guard: if the current track is about to finish, wait for the
//!    player to advance first
//! 3. insert right after the current track
//! 4. mirror update, confirmation reply and a background history write
//! 5. poll until the insert is observable
//! 6. move it behind the requests that were already waiting
//!
//! Submissions are strictly serialized: one pipeline runs at a time.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::history::{HistoryRecord, HistoryRecorder};
use super::player_state_tracker::PlayerStateTracker;
use super::queue_mirror::{QueueEntry, QueueMirror};
use crate::chat::replier::{ChatReplier, ReplyTarget};
use crate::error::ErrorKind;
use crate::player::client::PlayerError;
use crate::player::traits::PlayerApi;
use crate::player::types::TrackInfo;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::SyncTiming;
use crate::utils::short_link;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A request that passed command routing and search.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Chat login of the requester.
    pub requester: String,
    pub candidate: TrackInfo,
    pub reply_target: ReplyTarget,
}

/// Why a submission was not queued.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Song is already queued")]
    AlreadyQueued,

    /// The duplicate check could not read the player queue.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(#[source] PlayerError),

    #[error("Insert failed: {0}")]
    InsertFailed(#[source] PlayerError),

    /// Shutdown interrupted the pipeline.
    #[error("Submission cancelled")]
    Cancelled,
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyQueued => ErrorKind::Duplicate,
            Self::QueueUnavailable(_) | Self::InsertFailed(_) => ErrorKind::RequestFatal,
            Self::Cancelled => ErrorKind::Transient,
        }
    }

    /// Text sent to the requester, if any.
    pub fn chat_reply(&self) -> Option<&'static str> {
        match self {
            Self::AlreadyQueued => Some("Song is already in queue!"),
            Self::QueueUnavailable(_) => {
                Some("Internal error when checking if song is already in queue")
            }
            Self::InsertFailed(_) => Some("Internal error when adding song to queue"),
            Self::Cancelled => None,
        }
    }
}

/// The song is queued but may be in the wrong place.
#[derive(Debug, Error)]
pub enum OrderingDefect {
    /// The insert never showed up in the player queue within the budget.
    #[error("Inserted song was not observed in the queue")]
    Unconfirmed,

    #[error("Failed to move song: {0}")]
    MoveFailed(#[source] PlayerError),
}

impl OrderingDefect {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::OrderingDefect
    }

    /// Manual-fix notice addressed to the broadcaster.
    pub fn chat_reply(&self, broadcaster_login: &str) -> String {
        match self {
            Self::Unconfirmed => format!(
                "{} Failed to queue song in the right order. Must fix the song order manually!",
                broadcaster_login
            ),
            Self::MoveFailed(_) => format!(
                "{} Failed to move song in the right order. Must fix the song order manually!",
                broadcaster_login
            ),
        }
    }
}

/// Where the inserted song ended up.
#[derive(Debug)]
pub enum OrderingOutcome {
    /// The player inserted it at the right index already.
    InPlace,
    Moved { from: usize, to: usize },
    Defect(OrderingDefect),
}

/// A successfully queued request.
#[derive(Debug)]
pub struct Confirmation {
    pub track: TrackInfo,
    /// Requests that were already waiting ahead of this one.
    pub ahead: usize,
    pub ordering: OrderingOutcome,
}

/// Player-queue position of an observed insert.
#[derive(Debug, Clone, Copy)]
struct Observed {
    selected: usize,
    index: usize,
    len: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Synchronizer
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the submission pipeline.
pub struct QueueSynchronizer {
    player: Arc<dyn PlayerApi>,
    tracker: Arc<PlayerStateTracker>,
    mirror: Arc<QueueMirror>,
    replier: Arc<dyn ChatReplier>,
    history: Arc<dyn HistoryRecorder>,
    spawner: TokioSpawner,
    timing: SyncTiming,
    /// Held for the whole pipeline.
    submit_lock: tokio::sync::Mutex<()>,
    cancel_token: CancellationToken,
}

impl QueueSynchronizer {
    pub fn new(
        player: Arc<dyn PlayerApi>,
        tracker: Arc<PlayerStateTracker>,
        mirror: Arc<QueueMirror>,
        replier: Arc<dyn ChatReplier>,
        history: Arc<dyn HistoryRecorder>,
        spawner: TokioSpawner,
        timing: SyncTiming,
    ) -> Self {
        Self {
            player,
            tracker,
            mirror,
            replier,
            history,
            spawner,
            timing,
            submit_lock: tokio::sync::Mutex::new(()),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Makes polling loops exit once `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Queues `request` and replies to the requester.
    ///
    /// Every user-visible outcome is replied here; the returned value is for
    /// the caller's logging and for tests.
    pub async fn submit(&self, request: PendingRequest) -> Result<Confirmation, QueueError> {
        let _serial = self.submit_lock.lock().await;

        let result = self.run_pipeline(&request).await;
        match &result {
            Ok(confirmation) => {
                if let OrderingOutcome::Defect(defect) = &confirmation.ordering {
                    log::warn!(
                        "[Sync] Ordering defect for {}: {}",
                        confirmation.track.id,
                        defect
                    );
                    let text = defect.chat_reply(&request.reply_target.broadcaster_login);
                    self.replier.reply(&request.reply_target, &text).await;
                }
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::RequestFatal => log::error!(
                        "[Sync] Request {} from {} failed: {}",
                        request.candidate.id,
                        request.requester,
                        e
                    ),
                    _ => log::info!(
                        "[Sync] Request {} from {} not queued: {}",
                        request.candidate.id,
                        request.requester,
                        e
                    ),
                }
                if let Some(text) = e.chat_reply() {
                    self.replier.reply(&request.reply_target, text).await;
                }
            }
        }
        result
    }

    async fn run_pipeline(&self, request: &PendingRequest) -> Result<Confirmation, QueueError> {
        let track = &request.candidate;

        let queue = self
            .player
            .queue()
            .await
            .map_err(QueueError::QueueUnavailable)?;
        // The player's selected entry can be ahead of the last telemetry.
        let mut playing_id = queue
            .selected_id()
            .map(str::to_owned)
            .unwrap_or_else(|| self.tracker.current_track_id());
        if queue.is_queued_after_selected(&track.id)
            || self.mirror.is_waiting(&track.id, &playing_id)
        {
            return Err(QueueError::AlreadyQueued);
        }

        if let Some(advanced_to) = self.wait_out_track_end().await? {
            playing_id = advanced_to;
        }

        self.player
            .enqueue_after_current(&track.id)
            .await
            .map_err(QueueError::InsertFailed)?;

        let ahead = self.mirror.push(
            QueueEntry {
                requested_by: request.requester.clone(),
                track: track.clone(),
            },
            &playing_id,
        );
        log::info!(
            "{}: Queued song {} - {}",
            request.requester,
            track.title,
            track.artist
        );
        self.replier
            .reply(
                &request.reply_target,
                &format!(
                    "Added song: {} - {} {}",
                    track.title,
                    track.artist,
                    short_link(&track.id)
                ),
            )
            .await;
        self.record_history(track, &request.requester);

        let ordering = match self.observe_insert(&track.id).await? {
            None => OrderingOutcome::Defect(OrderingDefect::Unconfirmed),
            Some(observed) => self.reorder(&track.id, observed, ahead).await,
        };

        Ok(Confirmation {
            track: track.clone(),
            ahead,
            ordering,
        })
    }

    /// Blocks while the current track is within the near-end threshold, until
    /// the player moves on or the budget runs out.
    ///
    /// Returns the id the player moved on to, if it did.
    async fn wait_out_track_end(&self) -> Result<Option<String>, QueueError> {
        let state = self.tracker.snapshot();
        let remaining = state.remaining_secs();
        if !state.is_playing
            || state.current_track.is_empty()
            || remaining > self.timing.near_end_threshold_secs
        {
            return Ok(None);
        }

        let playing = state.current_track.id;
        let budget = self.timing.near_end_budget(remaining);
        log::info!(
            "[Sync] {}s left on {}, holding insert for up to {:?}",
            remaining,
            playing,
            budget
        );
        let deadline = Instant::now() + budget;

        loop {
            let current = self.tracker.current_track_id();
            if current != playing {
                log::debug!("[Sync] Track changed, releasing near-end guard");
                return Ok(Some(current));
            }
            match self.player.queue().await {
                Ok(queue) => {
                    if let Some(selected) = queue.selected_id().filter(|id| *id != playing) {
                        log::debug!("[Sync] Player advanced, releasing near-end guard");
                        return Ok(Some(selected.to_owned()));
                    }
                }
                Err(e) => log::debug!("[Sync] Guard poll failed: {}", e),
            }
            if Instant::now() >= deadline {
                log::warn!("[Sync] Near-end guard timed out on {}", playing);
                return Ok(None);
            }
            self.pause(self.timing.near_end_poll()).await?;
        }
    }

    /// Polls the player queue until both the selected entry and the inserted
    /// track are visible. `None` when the budget runs out.
    async fn observe_insert(&self, video_id: &str) -> Result<Option<Observed>, QueueError> {
        let deadline = Instant::now() + self.timing.reorder_timeout();
        loop {
            match self.player.queue().await {
                Ok(queue) => {
                    if let (Some(selected), Some(index)) =
                        (queue.selected_index(), queue.index_after_selected(video_id))
                    {
                        return Ok(Some(Observed {
                            selected,
                            index,
                            len: queue.items.len(),
                        }));
                    }
                }
                Err(e) if e.is_transient() => log::debug!("[Sync] Queue poll failed: {}", e),
                Err(e) => log::warn!("[Sync] Queue poll rejected: {}", e),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.pause(self.timing.reorder_poll()).await?;
        }
    }

    /// Moves the insert behind the `ahead` requests already waiting.
    async fn reorder(&self, video_id: &str, observed: Observed, ahead: usize) -> OrderingOutcome {
        let target = (observed.selected + 1 + ahead).min(observed.len.saturating_sub(1));
        if observed.index == target {
            return OrderingOutcome::InPlace;
        }
        log::info!(
            "[Sync] Moving {} from {} to {}",
            video_id,
            observed.index,
            target
        );
        match self.player.move_queue_item(observed.index, target).await {
            Ok(()) => OrderingOutcome::Moved {
                from: observed.index,
                to: target,
            },
            Err(e) => OrderingOutcome::Defect(OrderingDefect::MoveFailed(e)),
        }
    }

    fn record_history(&self, track: &TrackInfo, requester: &str) {
        let record = HistoryRecord::new(track, requester);
        let history = Arc::clone(&self.history);
        self.spawner.spawn(async move {
            if let Err(e) = history.record(record).await {
                log::warn!("[Sync] Failed to write request history: {}", e);
            }
        });
    }

    async fn pause(&self, duration: Duration) -> Result<(), QueueError> {
        tokio::select! {
            _ = self.cancel_token.cancelled() => Err(QueueError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::events::{EventEmitter, NoopEventEmitter};
    use crate::player::client::PlayerResult;
    use crate::player::types::{QueueItem, QueueSnapshot};
    use crate::services::history::HistoryError;

    // ─────────────────────────────────────────────────────────────────────
    // Mocks
    // ─────────────────────────────────────────────────────────────────────

    /// In-memory player queue. Inserts land right after the selected entry.
    #[derive(Default)]
    pub(crate) struct MockPlayer {
        pub queue: Mutex<Vec<QueueItem>>,
        pub current: Mutex<Option<TrackInfo>>,
        pub current_reads: AtomicUsize,
        pub queue_reads: AtomicUsize,
        pub inserts: Mutex<Vec<String>>,
        pub moves: Mutex<Vec<(usize, usize)>>,
        pub skips: AtomicUsize,
        /// Fails every read (queue and current track).
        pub fail_queue: AtomicBool,
        pub fail_insert: AtomicBool,
        pub fail_move: AtomicBool,
        pub fail_skip: AtomicBool,
        /// When set, inserts are accepted but never show up in the queue.
        pub hide_inserts: AtomicBool,
    }

    pub(crate) fn status_error(endpoint: &str, status: u16) -> PlayerError {
        PlayerError::HttpStatus {
            endpoint: endpoint.into(),
            status,
        }
    }

    pub(crate) fn item(id: &str, selected: bool) -> QueueItem {
        QueueItem {
            video_id: id.into(),
            title: format!("Title {}", id),
            artist: format!("Artist {}", id),
            selected,
        }
    }

    impl MockPlayer {
        pub fn with_queue(items: Vec<QueueItem>) -> Self {
            Self {
                queue: Mutex::new(items),
                ..Default::default()
            }
        }

        pub fn ids(&self) -> Vec<String> {
            self.queue.lock().iter().map(|i| i.video_id.clone()).collect()
        }

        /// Simulates the player advancing to the next entry.
        pub fn advance(&self) {
            let mut queue = self.queue.lock();
            if let Some(idx) = queue.iter().position(|i| i.selected) {
                queue[idx].selected = false;
                if let Some(next) = queue.get_mut(idx + 1) {
                    next.selected = true;
                }
            }
        }
    }

    #[async_trait]
    impl PlayerApi for MockPlayer {
        async fn current_track(&self) -> PlayerResult<Option<TrackInfo>> {
            self.current_reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_queue.load(Ordering::SeqCst) {
                return Err(status_error("/api/v1/song", 500));
            }
            Ok(self.current.lock().clone())
        }

        async fn queue(&self) -> PlayerResult<QueueSnapshot> {
            self.queue_reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_queue.load(Ordering::SeqCst) {
                return Err(status_error("/api/v1/queue", 500));
            }
            Ok(QueueSnapshot {
                items: self.queue.lock().clone(),
            })
        }

        async fn enqueue_after_current(&self, video_id: &str) -> PlayerResult<()> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(status_error("/api/v1/queue", 500));
            }
            self.inserts.lock().push(video_id.to_string());
            if !self.hide_inserts.load(Ordering::SeqCst) {
                let mut queue = self.queue.lock();
                let at = queue.iter().position(|i| i.selected).map_or(0, |s| s + 1);
                queue.insert(at, item(video_id, false));
            }
            Ok(())
        }

        async fn move_queue_item(&self, from: usize, to: usize) -> PlayerResult<()> {
            if self.fail_move.load(Ordering::SeqCst) {
                return Err(status_error("/api/v1/queue/{index}", 500));
            }
            self.moves.lock().push((from, to));
            let mut queue = self.queue.lock();
            let moved = queue.remove(from);
            queue.insert(to, moved);
            Ok(())
        }

        async fn skip(&self) -> PlayerResult<()> {
            if self.fail_skip.load(Ordering::SeqCst) {
                return Err(status_error("/api/v1/next", 500));
            }
            self.skips.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct MockReplier {
        pub replies: Mutex<Vec<String>>,
    }

    impl MockReplier {
        pub fn texts(&self) -> Vec<String> {
            self.replies.lock().clone()
        }
    }

    #[async_trait]
    impl ChatReplier for MockReplier {
        async fn reply(&self, _target: &ReplyTarget, text: &str) {
            self.replies.lock().push(text.to_string());
        }
    }

    #[derive(Default)]
    struct MockHistory {
        records: Mutex<Vec<HistoryRecord>>,
    }

    #[async_trait]
    impl HistoryRecorder for MockHistory {
        async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError> {
            self.records.lock().push(record);
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Harness
    // ─────────────────────────────────────────────────────────────────────

    struct Harness {
        player: Arc<MockPlayer>,
        tracker: Arc<PlayerStateTracker>,
        mirror: Arc<QueueMirror>,
        replier: Arc<MockReplier>,
        history: Arc<MockHistory>,
        sync: Arc<QueueSynchronizer>,
    }

    fn harness(player: MockPlayer) -> Harness {
        let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
        let player = Arc::new(player);
        let mirror = Arc::new(QueueMirror::new(Arc::clone(&emitter)));
        let tracker = Arc::new(PlayerStateTracker::new(Arc::clone(&mirror), emitter));
        let replier = Arc::new(MockReplier::default());
        let history = Arc::new(MockHistory::default());
        let sync = Arc::new(QueueSynchronizer::new(
            Arc::clone(&player) as Arc<dyn PlayerApi>,
            Arc::clone(&tracker),
            Arc::clone(&mirror),
            Arc::clone(&replier) as Arc<dyn ChatReplier>,
            Arc::clone(&history) as Arc<dyn HistoryRecorder>,
            TokioSpawner::current(),
            SyncTiming::default(),
        ));
        Harness {
            player,
            tracker,
            mirror,
            replier,
            history,
            sync,
        }
    }

    pub(crate) fn playing(id: &str, position: u64, duration: u64) -> Vec<u8> {
        format!(
            r#"{{"type":"PLAYER_INFO","isPlaying":true,"position":{},"song":{{"videoId":"{}","title":"Title {}","artist":"Artist {}","songDuration":{}}}}}"#,
            position, id, id, id, duration
        )
        .into_bytes()
    }

    pub(crate) fn video_changed(id: &str, duration: u64) -> Vec<u8> {
        format!(
            r#"{{"type":"VIDEO_CHANGED","position":0,"song":{{"videoId":"{}","title":"Title {}","artist":"Artist {}","songDuration":{}}}}}"#,
            id, id, id, duration
        )
        .into_bytes()
    }

    fn request(id: &str, requester: &str) -> PendingRequest {
        PendingRequest {
            requester: requester.into(),
            candidate: TrackInfo {
                id: id.into(),
                title: format!("Song {}", id),
                artist: format!("Band {}", id),
                duration_seconds: 180,
                image_url: String::new(),
            },
            reply_target: ReplyTarget {
                broadcaster_id: "100".into(),
                broadcaster_login: "streamer".into(),
                reply_to: Some("msg".into()),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tests
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn request_for_playing_track_is_inserted_immediately() {
        let h = harness(MockPlayer::with_queue(vec![item("abc", true)]));
        h.tracker.apply_telemetry_event(&video_changed("abc", 200));
        h.tracker.apply_telemetry_event(&playing("abc", 0, 200));

        let confirmation = h.sync.submit(request("abc", "viewer")).await.unwrap();

        assert_eq!(*h.player.inserts.lock(), vec!["abc".to_string()]);
        assert!(matches!(confirmation.ordering, OrderingOutcome::InPlace));
        assert_eq!(confirmation.ahead, 0);
        let replies = h.replier.texts();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("Added song"));
        assert_eq!(replies[0], "Added song: Song abc - Band abc https://youtu.be/abc");
    }

    #[tokio::test]
    async fn later_requests_are_moved_behind_earlier_ones() {
        let h = harness(MockPlayer::with_queue(vec![
            item("old", false),
            item("now", true),
            item("auto", false),
        ]));
        h.tracker.apply_telemetry_event(&playing("now", 10, 200));

        let first = h.sync.submit(request("r1", "alice")).await.unwrap();
        assert!(matches!(first.ordering, OrderingOutcome::InPlace));
        assert_eq!(h.player.ids(), vec!["old", "now", "r1", "auto"]);

        let second = h.sync.submit(request("r2", "bob")).await.unwrap();
        assert_eq!(second.ahead, 1);
        assert!(matches!(
            second.ordering,
            OrderingOutcome::Moved { from: 2, to: 3 }
        ));
        assert_eq!(h.player.ids(), vec!["old", "now", "r1", "r2", "auto"]);

        let third = h.sync.submit(request("r3", "carol")).await.unwrap();
        assert_eq!(third.ahead, 2);
        assert_eq!(h.player.ids(), vec!["old", "now", "r1", "r2", "r3", "auto"]);
        assert_eq!(h.mirror.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_duplicates_insert_once() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]));
        h.tracker.apply_telemetry_event(&playing("now", 10, 200));

        let (a, b) = tokio::join!(
            h.sync.submit(request("dup", "alice")),
            h.sync.submit(request("dup", "bob")),
        );

        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let err = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(err, QueueError::AlreadyQueued));
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        assert_eq!(h.player.inserts.lock().len(), 1);
        assert!(h.replier.texts().contains(&"Song is already in queue!".to_string()));
    }

    #[tokio::test]
    async fn waiting_request_is_a_duplicate_even_if_player_lost_it() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]));
        h.tracker.apply_telemetry_event(&playing("now", 10, 200));
        h.sync.submit(request("a", "alice")).await.unwrap();
        h.player.queue.lock().retain(|i| i.video_id != "a");

        let err = h.sync.submit(request("a", "bob")).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyQueued));
        assert_eq!(h.player.inserts.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn near_end_guard_holds_insert_until_track_changes() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true), item("next", false)]));
        h.tracker.apply_telemetry_event(&playing("now", 197, 200));

        let sync = Arc::clone(&h.sync);
        let task = tokio::spawn(async move { sync.submit(request("req", "alice")).await });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(h.player.inserts.lock().is_empty());

        h.player.advance();
        h.tracker.apply_telemetry_event(&video_changed("next", 240));
        let confirmation = task.await.unwrap().unwrap();

        assert_eq!(*h.player.inserts.lock(), vec!["req".to_string()]);
        assert!(matches!(confirmation.ordering, OrderingOutcome::InPlace));
        assert_eq!(h.player.ids(), vec!["now", "next", "req"]);
    }

    #[tokio::test]
    async fn playing_request_can_be_requested_again() {
        let h = harness(MockPlayer::with_queue(vec![item("x", true)]));
        h.tracker.apply_telemetry_event(&playing("x", 10, 200));
        h.sync.submit(request("a", "alice")).await.unwrap();

        h.player.advance();
        h.tracker.apply_telemetry_event(&video_changed("a", 180));
        assert_eq!(h.mirror.head_id().as_deref(), Some("a"));

        let confirmation = h.sync.submit(request("a", "bob")).await.unwrap();
        assert_eq!(confirmation.ahead, 0);
        assert_eq!(*h.player.inserts.lock(), vec!["a".to_string(), "a".to_string()]);
        assert_eq!(h.player.ids(), vec!["x", "a", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_release_before_telemetry_keeps_order() {
        let h = harness(MockPlayer::with_queue(vec![item("x", true), item("auto", false)]));
        h.tracker.apply_telemetry_event(&playing("x", 10, 200));
        h.sync.submit(request("a", "alice")).await.unwrap();
        assert_eq!(h.player.ids(), vec!["x", "a", "auto"]);
        h.tracker.apply_telemetry_event(&playing("x", 197, 200));

        let sync = Arc::clone(&h.sync);
        let task = tokio::spawn(async move { sync.submit(request("r", "bob")).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.player.inserts.lock().len(), 1);

        // The player moves on to "a" before its VIDEO_CHANGED arrives.
        h.player.advance();
        let confirmation = task.await.unwrap().unwrap();

        assert_eq!(confirmation.ahead, 0);
        assert!(matches!(confirmation.ordering, OrderingOutcome::InPlace));
        assert_eq!(h.player.ids(), vec!["x", "a", "r", "auto"]);
    }

    #[tokio::test(start_paused = true)]
    async fn near_end_guard_gives_up_after_budget() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]));
        h.tracker.apply_telemetry_event(&playing("now", 197, 200));

        let started = Instant::now();
        h.sync.submit(request("req", "alice")).await.unwrap();

        // 3s remaining plus the 10s buffer.
        assert!(started.elapsed() >= Duration::from_secs(13));
        assert_eq!(h.player.inserts.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_player_skips_near_end_guard() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]));
        h.tracker.apply_telemetry_event(
            br#"{"type":"PLAYER_INFO","isPlaying":false,"position":198,"song":{"videoId":"now","songDuration":200}}"#,
        );

        let started = Instant::now();
        h.sync.submit(request("req", "alice")).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn insert_failure_aborts_without_touching_mirror() {
        let player = MockPlayer::with_queue(vec![item("now", true)]);
        player.fail_insert.store(true, Ordering::SeqCst);
        let h = harness(player);

        let err = h.sync.submit(request("a", "alice")).await.unwrap_err();
        assert!(matches!(err, QueueError::InsertFailed(_)));
        assert_eq!(err.kind(), ErrorKind::RequestFatal);
        assert!(h.mirror.is_empty());
        assert_eq!(
            h.replier.texts(),
            vec!["Internal error when adding song to queue".to_string()]
        );
    }

    #[tokio::test]
    async fn unreadable_queue_aborts_before_insert() {
        let player = MockPlayer::with_queue(vec![item("now", true)]);
        player.fail_queue.store(true, Ordering::SeqCst);
        let h = harness(player);

        let err = h.sync.submit(request("a", "alice")).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueUnavailable(_)));
        assert!(h.player.inserts.lock().is_empty());
        assert_eq!(
            h.replier.texts(),
            vec!["Internal error when checking if song is already in queue".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unobservable_insert_asks_for_manual_fix() {
        let player = MockPlayer::with_queue(vec![item("now", true)]);
        player.hide_inserts.store(true, Ordering::SeqCst);
        let h = harness(player);

        let started = Instant::now();
        let confirmation = h.sync.submit(request("a", "alice")).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(matches!(
            confirmation.ordering,
            OrderingOutcome::Defect(OrderingDefect::Unconfirmed)
        ));
        let replies = h.replier.texts();
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[1],
            "streamer Failed to queue song in the right order. Must fix the song order manually!"
        );
        // The song itself was queued.
        assert_eq!(h.mirror.len(), 1);
    }

    #[tokio::test]
    async fn failed_move_is_an_ordering_defect() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]));
        h.tracker.apply_telemetry_event(&playing("now", 10, 200));
        h.sync.submit(request("r1", "alice")).await.unwrap();
        h.player.fail_move.store(true, Ordering::SeqCst);

        let confirmation = h.sync.submit(request("r2", "bob")).await.unwrap();
        let OrderingOutcome::Defect(defect) = confirmation.ordering else {
            panic!("expected ordering defect");
        };
        assert!(matches!(defect, OrderingDefect::MoveFailed(_)));
        assert_eq!(defect.kind(), ErrorKind::OrderingDefect);
        assert!(h
            .replier
            .texts()
            .last()
            .unwrap()
            .contains("Failed to move song in the right order"));
    }

    #[tokio::test]
    async fn accepted_request_is_recorded_in_history() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]));
        h.sync.submit(request("a", "alice")).await.unwrap();

        for _ in 0..10 {
            if !h.history.records.lock().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let records = h.history.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].video_id, "a");
        assert_eq!(records[0].requested_by, "alice");
    }

    #[tokio::test]
    async fn cancellation_stops_polling() {
        let player = MockPlayer::with_queue(vec![item("now", true)]);
        player.hide_inserts.store(true, Ordering::SeqCst);
        let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
        let mirror = Arc::new(QueueMirror::new(Arc::clone(&emitter)));
        let tracker = Arc::new(PlayerStateTracker::new(Arc::clone(&mirror), emitter));
        let token = CancellationToken::new();
        let sync = QueueSynchronizer::new(
            Arc::new(player),
            tracker,
            mirror,
            Arc::new(MockReplier::default()),
            Arc::new(MockHistory::default()),
            TokioSpawner::current(),
            SyncTiming::default(),
        )
        .with_cancel_token(token.clone());

        token.cancel();
        let err = sync.submit(request("a", "alice")).await.unwrap_err();
        assert!(matches!(err, QueueError::Cancelled));
        assert!(err.chat_reply().is_none());
    }
}
