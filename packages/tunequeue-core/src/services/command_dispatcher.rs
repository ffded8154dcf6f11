//! Routes chat events to commands.
//!
//! Every command runs on its own task so a slow submission never holds up
//! chat processing. Failures end in at most one plain-text reply.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::player_state_tracker::PlayerStateTracker;
use super::queue_synchronizer::{PendingRequest, QueueSynchronizer};
use super::rate_gate::RateGate;
use crate::chat::replier::{ChatReplier, ReplyTarget};
use crate::chat::types::{Capabilities, ChatEvent, ChatMessage};
use crate::events::EventEmitter;
use crate::player::traits::PlayerApi;
use crate::player::types::QueueSnapshot;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::search::{parse_search_query, SearchProvider};
use crate::state::{Config, ConnectionState};
use crate::utils::short_link;

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// A recognised chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!sr <query>` or a redemption of the configured song-request reward.
    SongRequest { query: String, via_reward: bool },
    Skip,
    Song,
    Queue,
}

/// Classifies a chat message by prefix of its trimmed text. Unmatched text
/// yields `None`.
pub fn classify(message: &ChatMessage, reward_id: Option<&str>) -> Option<Command> {
    let text = message.text.trim();

    let redeemed = match (reward_id, message.reward_id.as_deref()) {
        (Some(configured), Some(redeemed)) => configured == redeemed,
        _ => false,
    };
    if redeemed {
        return Some(Command::SongRequest {
            query: parse_search_query(text),
            via_reward: true,
        });
    }
    if text.starts_with("!sr ") {
        return Some(Command::SongRequest {
            query: parse_search_query(text),
            via_reward: false,
        });
    }
    if text.starts_with("!skip") {
        Some(Command::Skip)
    } else if text.starts_with("!song") {
        Some(Command::Song)
    } else if text.starts_with("!queue") {
        Some(Command::Queue)
    } else {
        None
    }
}

/// Formats the `!queue` reply: `Now: T - A, #1: T - A, ...`.
fn format_queue(queue: &QueueSnapshot, limit: usize) -> Option<String> {
    let upcoming = queue.upcoming(limit);
    if upcoming.is_empty() {
        return None;
    }
    let parts: Vec<String> = upcoming
        .iter()
        .enumerate()
        .map(|(n, item)| match n {
            0 => format!("Now: {} - {}", item.title, item.artist),
            n => format!("#{}: {} - {}", n, item.title, item.artist),
        })
        .collect();
    Some(parts.join(", "))
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Collaborators the dispatcher calls into.
pub struct DispatcherServices {
    pub player: Arc<dyn PlayerApi>,
    pub tracker: Arc<PlayerStateTracker>,
    pub search: Arc<dyn SearchProvider>,
    pub synchronizer: Arc<QueueSynchronizer>,
    pub replier: Arc<dyn ChatReplier>,
    pub connection: Arc<ConnectionState>,
    pub emitter: Arc<dyn EventEmitter>,
    pub spawner: TokioSpawner,
}

/// Applies authorization and rate limits, then runs commands.
pub struct CommandDispatcher {
    services: DispatcherServices,
    reward_id: Option<String>,
    queue_reply_limit: usize,
    skip_gate: RateGate,
    song_gate: RateGate,
    queue_gate: RateGate,
}

impl CommandDispatcher {
    pub fn new(services: DispatcherServices, config: &Config) -> Self {
        let cooldowns = &config.cooldowns;
        Self {
            services,
            reward_id: config.reward_id.clone().filter(|id| !id.is_empty()),
            queue_reply_limit: config.queue_reply_limit,
            skip_gate: RateGate::new("skip", Duration::from_secs(cooldowns.skip_secs)),
            song_gate: RateGate::new("song", Duration::from_secs(cooldowns.song_secs)),
            queue_gate: RateGate::new("queue", Duration::from_secs(cooldowns.queue_secs)),
        }
    }

    /// Consumes chat events until the channel closes or `cancel` fires.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ChatEvent>, cancel: CancellationToken) {
        log::info!("[Dispatch] Started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
        log::info!("[Dispatch] Stopped");
    }

    /// Handles one event. Chat messages are processed on their own task.
    pub fn handle_event(self: &Arc<Self>, event: ChatEvent) {
        match event {
            ChatEvent::Message(message) => {
                let this = Arc::clone(self);
                self.services
                    .spawner
                    .spawn(async move { this.handle_message(message).await });
            }
            ChatEvent::StreamOnline => self.set_stream_online(true),
            ChatEvent::StreamOffline => self.set_stream_online(false),
            ChatEvent::RewardRedeemed {
                user_login,
                reward_id,
                user_input,
            } => {
                log::info!(
                    "[Dispatch] {} redeemed reward {} ({})",
                    user_login,
                    reward_id,
                    user_input
                );
            }
        }
    }

    fn set_stream_online(&self, online: bool) {
        let connection = &self.services.connection;
        if connection.set_stream_online(online) {
            log::info!(
                "[Dispatch] Stream is {}",
                if online { "online" } else { "offline" }
            );
            self.services.emitter.emit_status(connection.snapshot());
        }
    }

    /// Classifies, authorizes and executes one chat message.
    pub async fn handle_message(&self, message: ChatMessage) {
        log::info!("{}: {}", message.chatter_user_login, message.text);

        let Some(command) = classify(&message, self.reward_id.as_deref()) else {
            return;
        };
        let caps = Capabilities::of(&message);
        if !self.services.connection.stream_online() && !caps.is_broadcaster {
            log::debug!("[Dispatch] Stream offline, ignoring {:?}", command);
            return;
        }

        let target = ReplyTarget::for_message(&message);
        match command {
            Command::SongRequest { query, via_reward } => {
                if via_reward || caps.is_subscriber {
                    self.request_song(&message, &query, target).await;
                }
            }
            Command::Skip => {
                if caps.is_moderator {
                    self.skip(&target).await;
                }
            }
            Command::Song => self.current_song(&target).await,
            Command::Queue => self.queue(&target).await,
        }
    }

    async fn request_song(&self, message: &ChatMessage, query: &str, target: ReplyTarget) {
        let candidate = match self.services.search.search(query).await {
            Ok(track) => track,
            Err(e) => {
                log::warn!(
                    "[Dispatch] Search for \"{}\" by {} failed: {}",
                    query,
                    message.chatter_user_login,
                    e
                );
                return;
            }
        };
        let request = PendingRequest {
            requester: message.chatter_user_login.clone(),
            candidate,
            reply_target: target,
        };
        // Outcomes are logged and replied by the synchronizer.
        let _ = self.services.synchronizer.submit(request).await;
    }

    async fn skip(&self, target: &ReplyTarget) {
        if !self.skip_gate.try_acquire() {
            return;
        }
        let title = self.services.tracker.snapshot().current_track.title;
        let text = match self.services.player.skip().await {
            Ok(()) if title.is_empty() => "Skipped song!".to_string(),
            Ok(()) => format!("Skipped {}!", title),
            Err(e) => {
                log::error!("[Dispatch] Skip failed: {}", e);
                "Internal failure to skip song!".to_string()
            }
        };
        self.services.replier.reply(target, &text).await;
    }

    async fn current_song(&self, target: &ReplyTarget) {
        if !self.song_gate.try_acquire() {
            return;
        }
        let text = match self.services.player.current_track().await {
            Ok(Some(track)) => format!(
                "Song: {} - {} {}",
                track.title,
                track.artist,
                short_link(&track.id)
            ),
            Ok(None) => "Nothing is playing!".to_string(),
            Err(e) => {
                log::error!("[Dispatch] Failed to get song info: {}", e);
                "Internal failure to get song details!".to_string()
            }
        };
        self.services.replier.reply(target, &text).await;
    }

    async fn queue(&self, target: &ReplyTarget) {
        if !self.queue_gate.try_acquire() {
            return;
        }
        let text = match self.services.player.queue().await {
            Ok(queue) => format_queue(&queue, self.queue_reply_limit)
                .unwrap_or_else(|| "Queue is empty!".to_string()),
            Err(e) => {
                log::error!("[Dispatch] Failed to get queue info: {}", e);
                "Internal failure to get queue detail!".to_string()
            }
        };
        self.services.replier.reply(target, &text).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::chat::types::Badge;
    use crate::events::NoopEventEmitter;
    use crate::player::types::TrackInfo;
    use crate::search::SearchError;
    use crate::services::history::NoopHistory;
    use crate::services::queue_mirror::QueueMirror;
    use crate::services::queue_synchronizer::tests::{
        item, playing, video_changed, MockPlayer, MockReplier,
    };
    use crate::state::SyncTiming;

    /// Resolves every query to a track with the query as id.
    struct EchoSearch;

    #[async_trait]
    impl SearchProvider for EchoSearch {
        async fn search(&self, query: &str) -> Result<TrackInfo, SearchError> {
            if query == "missing" {
                return Err(SearchError::NotFound(query.into()));
            }
            Ok(TrackInfo {
                id: query.into(),
                title: format!("Title {}", query),
                artist: format!("Artist {}", query),
                duration_seconds: 200,
                image_url: String::new(),
            })
        }
    }

    struct Harness {
        player: Arc<MockPlayer>,
        tracker: Arc<PlayerStateTracker>,
        replier: Arc<MockReplier>,
        connection: Arc<ConnectionState>,
        dispatcher: Arc<CommandDispatcher>,
    }

    fn harness(player: MockPlayer, config: Config) -> Harness {
        let emitter: Arc<dyn EventEmitter> = Arc::new(NoopEventEmitter);
        let player = Arc::new(player);
        let mirror = Arc::new(QueueMirror::new(Arc::clone(&emitter)));
        let tracker = Arc::new(PlayerStateTracker::new(mirror.clone(), emitter.clone()));
        let replier = Arc::new(MockReplier::default());
        let connection = Arc::new(ConnectionState::new());
        connection.set_stream_online(true);
        let synchronizer = Arc::new(QueueSynchronizer::new(
            player.clone(),
            tracker.clone(),
            mirror,
            replier.clone(),
            Arc::new(NoopHistory),
            TokioSpawner::current(),
            SyncTiming::default(),
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(
            DispatcherServices {
                player: player.clone(),
                tracker: tracker.clone(),
                search: Arc::new(EchoSearch),
                synchronizer,
                replier: replier.clone(),
                connection: connection.clone(),
                emitter,
                spawner: TokioSpawner::current(),
            },
            &config,
        ));
        Harness {
            player,
            tracker,
            replier,
            connection,
            dispatcher,
        }
    }

    fn chat(text: &str, badges: &[&str]) -> ChatMessage {
        ChatMessage {
            message_id: "m".into(),
            broadcaster_user_id: "100".into(),
            broadcaster_user_login: "streamer".into(),
            chatter_user_id: "200".into(),
            chatter_user_login: "viewer".into(),
            text: text.into(),
            badges: badges
                .iter()
                .map(|set_id| Badge {
                    set_id: set_id.to_string(),
                    id: "1".into(),
                })
                .collect(),
            reward_id: None,
        }
    }

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(
            classify(&chat("  !sr some song ", &[]), None),
            Some(Command::SongRequest {
                query: "some song".into(),
                via_reward: false
            })
        );
        assert_eq!(classify(&chat("!skip please", &[]), None), Some(Command::Skip));
        assert_eq!(classify(&chat("!song", &[]), None), Some(Command::Song));
        assert_eq!(classify(&chat("!queue", &[]), None), Some(Command::Queue));
        assert_eq!(classify(&chat("!sr", &[]), None), None);
        assert_eq!(classify(&chat("hello !song", &[]), None), None);
    }

    #[test]
    fn reward_redemption_uses_whole_text() {
        let mut message = chat("lofi beats", &[]);
        message.reward_id = Some("reward-1".into());
        assert_eq!(
            classify(&message, Some("reward-1")),
            Some(Command::SongRequest {
                query: "lofi beats".into(),
                via_reward: true
            })
        );
        assert_eq!(classify(&message, Some("other")), None);
        assert_eq!(classify(&message, None), None);
    }

    #[test]
    fn queue_reply_format() {
        let queue = QueueSnapshot {
            items: vec![item("old", false), item("a", true), item("b", false), item("c", false)],
        };
        assert_eq!(
            format_queue(&queue, 6).unwrap(),
            "Now: Title a - Artist a, #1: Title b - Artist b, #2: Title c - Artist c"
        );
        assert_eq!(
            format_queue(&queue, 2).unwrap(),
            "Now: Title a - Artist a, #1: Title b - Artist b"
        );
        assert_eq!(format_queue(&QueueSnapshot::default(), 6), None);
    }

    #[tokio::test]
    async fn subscriber_request_for_playing_track_is_added() {
        let h = harness(MockPlayer::with_queue(vec![item("abc", true)]), Config::default());
        h.tracker.apply_telemetry_event(&video_changed("abc", 200));
        h.tracker.apply_telemetry_event(&playing("abc", 0, 200));

        h.dispatcher
            .handle_message(chat("!sr abc", &["subscriber"]))
            .await;

        assert_eq!(*h.player.inserts.lock(), vec!["abc".to_string()]);
        let replies = h.replier.texts();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("Added song"));
    }

    #[tokio::test]
    async fn non_subscriber_requests_are_ignored() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]), Config::default());
        h.dispatcher.handle_message(chat("!sr abc", &[])).await;
        assert!(h.player.inserts.lock().is_empty());
        assert!(h.replier.texts().is_empty());
    }

    #[tokio::test]
    async fn reward_requests_bypass_subscriber_check() {
        let config = Config {
            reward_id: Some("reward-1".into()),
            ..Config::default()
        };
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]), config);
        let mut message = chat("xyz", &[]);
        message.reward_id = Some("reward-1".into());

        h.dispatcher.handle_message(message).await;
        assert_eq!(*h.player.inserts.lock(), vec!["xyz".to_string()]);
    }

    #[tokio::test]
    async fn offline_stream_ignores_everyone_but_broadcaster() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]), Config::default());
        h.connection.set_stream_online(false);

        h.dispatcher
            .handle_message(chat("!sr abc", &["moderator"]))
            .await;
        h.dispatcher.handle_message(chat("!song", &["moderator"])).await;
        assert!(h.player.inserts.lock().is_empty());
        assert_eq!(h.player.current_reads.load(Ordering::SeqCst), 0);

        h.dispatcher
            .handle_message(chat("!sr abc", &["broadcaster"]))
            .await;
        assert_eq!(*h.player.inserts.lock(), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn failed_search_is_silent() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]), Config::default());
        h.dispatcher
            .handle_message(chat("!sr missing", &["subscriber"]))
            .await;
        assert!(h.player.inserts.lock().is_empty());
        assert!(h.replier.texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_twice_from_two_moderators_skips_once() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]), Config::default());
        h.tracker.apply_telemetry_event(&playing("now", 30, 200));

        let mut first = chat("!skip", &["moderator"]);
        first.chatter_user_login = "mod_one".into();
        let mut second = chat("!skip", &["moderator"]);
        second.chatter_user_login = "mod_two".into();

        h.dispatcher.handle_message(first).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        h.dispatcher.handle_message(second).await;

        assert_eq!(h.player.skips.load(Ordering::SeqCst), 1);
        assert_eq!(h.replier.texts(), vec!["Skipped Title now!".to_string()]);
    }

    #[tokio::test]
    async fn skip_requires_moderator() {
        let h = harness(MockPlayer::with_queue(vec![item("now", true)]), Config::default());
        h.dispatcher
            .handle_message(chat("!skip", &["subscriber"]))
            .await;
        assert_eq!(h.player.skips.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_failure_replies_generic_notice() {
        let player = MockPlayer::with_queue(vec![item("now", true)]);
        player.fail_skip.store(true, Ordering::SeqCst);
        let h = harness(player, Config::default());
        h.dispatcher
            .handle_message(chat("!skip", &["broadcaster"]))
            .await;
        assert_eq!(
            h.replier.texts(),
            vec!["Internal failure to skip song!".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn song_is_read_through_and_rate_gated() {
        let player = MockPlayer::with_queue(vec![item("now", true)]);
        *player.current.lock() = Some(TrackInfo {
            id: "vid".into(),
            title: "Song".into(),
            artist: "Band".into(),
            ..Default::default()
        });
        let h = harness(player, Config::default());

        h.dispatcher.handle_message(chat("!song", &[])).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        h.dispatcher.handle_message(chat("!song", &[])).await;

        assert_eq!(h.player.current_reads.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.replier.texts(),
            vec!["Song: Song - Band https://youtu.be/vid".to_string()]
        );

        tokio::time::advance(Duration::from_secs(5)).await;
        h.dispatcher.handle_message(chat("!song", &[])).await;
        assert_eq!(h.player.current_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn read_failures_never_leak_raw_errors() {
        let player = MockPlayer::with_queue(vec![item("now", true)]);
        player.fail_queue.store(true, Ordering::SeqCst);
        let h = harness(player, Config::default());

        h.dispatcher.handle_message(chat("!song", &[])).await;
        h.dispatcher.handle_message(chat("!queue", &[])).await;

        assert_eq!(
            h.replier.texts(),
            vec![
                "Internal failure to get song details!".to_string(),
                "Internal failure to get queue detail!".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn queue_lists_from_selected() {
        let h = harness(
            MockPlayer::with_queue(vec![item("old", false), item("a", true), item("b", false)]),
            Config::default(),
        );
        h.dispatcher.handle_message(chat("!queue", &[])).await;
        assert_eq!(
            h.replier.texts(),
            vec!["Now: Title a - Artist a, #1: Title b - Artist b".to_string()]
        );
    }

    #[tokio::test]
    async fn stream_status_events_update_connection_state() {
        let h = harness(MockPlayer::default(), Config::default());
        h.dispatcher.handle_event(ChatEvent::StreamOffline);
        assert!(!h.connection.stream_online());
        h.dispatcher.handle_event(ChatEvent::StreamOnline);
        assert!(h.connection.stream_online());
    }

    #[tokio::test]
    async fn run_dispatches_until_channel_closes() {
        let h = harness(MockPlayer::default(), Config::default());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(Arc::clone(&h.dispatcher).run(rx, CancellationToken::new()));

        tx.send(ChatEvent::StreamOffline).await.unwrap();
        drop(tx);
        task.await.unwrap();
        assert!(!h.connection.stream_online());
    }
}
