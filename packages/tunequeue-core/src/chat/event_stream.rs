//! Chat event-stream client.
//!
//! One client per identity. Each connection walks
//! `Disconnected -> Connecting -> Subscribed -> (Errored | Disconnected)`.
//! Subscriptions are created on every welcome frame, except on sessions the
//! server moved us to with a reconnect URL: those keep their subscriptions.
//! Reconnecting and credential checks belong to the
//! [`ChatSupervisor`](super::supervisor::ChatSupervisor).

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use super::credentials::Identity;
use super::helix::{HelixClient, SubscriptionRequest};
use super::types::{ChatEvent, ServerMessage};
use crate::events::EventEmitter;
use crate::protocol_constants::{
    DEFAULT_KEEPALIVE_TIMEOUT_SECS, EVENTSUB_WS_URL, KEEPALIVE_GRACE_SECS, SUB_CHAT_MESSAGE,
    SUB_REWARD_REDEMPTION, SUB_STREAM_OFFLINE, SUB_STREAM_ONLINE,
};
use crate::state::ConnectionState;
use crate::utils::truncate_for_log;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that end an event-stream session.
#[derive(Debug, Error)]
pub enum EventStreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("Connection closed by server")]
    Closed,

    #[error("No frame received within {0:?}")]
    KeepaliveTimeout(Duration),

    #[error("No access token for {0} account")]
    MissingToken(Identity),

    /// The bot cannot subscribe before the broadcaster account is known.
    #[error("Broadcaster account not validated yet")]
    MissingBroadcaster,

    #[error("Chat API error: {0}")]
    Helix(#[from] super::helix::HelixError),
}

/// Subscription state of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionStatus {
    Disconnected,
    Connecting,
    Subscribed,
    /// Connected, but every subscription attempt failed.
    Errored,
}

/// How a session ended without an error.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
    /// The chat event consumer went away.
    ConsumerGone,
    /// The server asked us to move; connect again right away.
    Reconnect,
}

/// Everything one connection needs, resolved by the supervisor.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: String,
    pub broadcaster_id: String,
    pub subscriptions: Vec<SubscriptionRequest>,
}

/// Subscriptions an identity needs.
///
/// The broadcaster reads chat itself only when no bot account is configured.
pub fn subscriptions_for(
    identity: Identity,
    broadcaster_id: &str,
    own_user_id: &str,
    bot_configured: bool,
) -> Vec<SubscriptionRequest> {
    let on_channel = |kind: &'static str, user_id: Option<&str>| SubscriptionRequest {
        kind,
        broadcaster_user_id: broadcaster_id.to_string(),
        user_id: user_id.map(str::to_string),
    };
    match identity {
        Identity::Main => {
            let mut subs = vec![
                on_channel(SUB_STREAM_ONLINE, None),
                on_channel(SUB_STREAM_OFFLINE, None),
                on_channel(SUB_REWARD_REDEMPTION, None),
            ];
            if !bot_configured {
                subs.push(on_channel(SUB_CHAT_MESSAGE, Some(own_user_id)));
            }
            subs
        }
        Identity::Bot => vec![on_channel(SUB_CHAT_MESSAGE, Some(own_user_id))],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Connection to the chat event stream for one identity.
pub struct EventStreamClient {
    identity: Identity,
    url: String,
    helix: HelixClient,
    connection: Arc<ConnectionState>,
    emitter: Arc<dyn EventEmitter>,
    status: Mutex<SubscriptionStatus>,
    /// Set by a reconnect frame; used once by the next session.
    reconnect_url: Mutex<Option<String>>,
}

impl EventStreamClient {
    pub fn new(
        identity: Identity,
        helix: HelixClient,
        connection: Arc<ConnectionState>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            identity,
            url: EVENTSUB_WS_URL.to_string(),
            helix,
            connection,
            emitter,
            status: Mutex::new(SubscriptionStatus::Disconnected),
            reconnect_url: Mutex::new(None),
        }
    }

    /// Overrides the event-stream endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn status(&self) -> SubscriptionStatus {
        *self.status.lock()
    }

    /// Runs one connection until it ends.
    pub async fn run_session(
        &self,
        ctx: &SessionContext,
        tx: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, EventStreamError> {
        let (url, resumed) = match self.reconnect_url.lock().take() {
            Some(url) => (url, true),
            None => (self.url.clone(), false),
        };

        self.set_status(SubscriptionStatus::Connecting);
        let connect = tokio::select! {
            _ = cancel.cancelled() => {
                self.set_status(SubscriptionStatus::Disconnected);
                return Ok(SessionEnd::Cancelled);
            }
            result = connect_async(url.as_str()) => result,
        };
        let socket = match connect {
            Ok((socket, _response)) => socket,
            Err(e) => {
                self.set_status(SubscriptionStatus::Disconnected);
                return Err(e.into());
            }
        };
        log::info!("[EventStream:{}] Connected", self.identity);

        let result = self.pump(socket, ctx, resumed, tx, cancel).await;
        self.set_status(SubscriptionStatus::Disconnected);
        result
    }

    async fn pump<S>(
        &self,
        mut socket: S,
        ctx: &SessionContext,
        resumed: bool,
        tx: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, EventStreamError>
    where
        S: futures::Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let mut keepalive = Duration::from_secs(DEFAULT_KEEPALIVE_TIMEOUT_SECS + KEEPALIVE_GRACE_SECS);

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                frame = tokio::time::timeout(keepalive, socket.next()) => frame,
            };
            let text = match frame {
                Err(_) => return Err(EventStreamError::KeepaliveTimeout(keepalive)),
                Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return Err(EventStreamError::Closed),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(Message::Text(text)))) => text,
                Ok(Some(Ok(_))) => continue,
            };

            let message = match ServerMessage::parse(text.as_str()) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!(
                        "[EventStream:{}] Dropping malformed frame ({}): {}",
                        self.identity,
                        e,
                        truncate_for_log(text.as_str(), 200)
                    );
                    continue;
                }
            };

            match message {
                ServerMessage::Welcome(session) => {
                    if let Some(secs) = session.keepalive_timeout_seconds.filter(|s| *s > 0) {
                        keepalive = Duration::from_secs(secs + KEEPALIVE_GRACE_SECS);
                    }
                    log::info!(
                        "[EventStream:{}] Session {} (keepalive {:?})",
                        self.identity,
                        session.id,
                        keepalive
                    );
                    if resumed {
                        self.set_status(SubscriptionStatus::Subscribed);
                    } else {
                        self.subscribe_all(ctx, &session.id).await;
                    }
                    if self.identity == Identity::Main {
                        self.refresh_stream_online(ctx).await;
                    }
                }
                ServerMessage::Keepalive => {
                    log::trace!("[EventStream:{}] Keepalive", self.identity);
                }
                ServerMessage::Notification {
                    subscription_type,
                    event,
                } => match ChatEvent::from_notification(&subscription_type, event) {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            return Ok(SessionEnd::ConsumerGone);
                        }
                    }
                    Ok(None) => log::debug!(
                        "[EventStream:{}] Ignoring {} notification",
                        self.identity,
                        subscription_type
                    ),
                    Err(e) => log::warn!(
                        "[EventStream:{}] Malformed {} event: {}",
                        self.identity,
                        subscription_type,
                        e
                    ),
                },
                ServerMessage::Reconnect(session) => {
                    log::info!("[EventStream:{}] Server requested reconnect", self.identity);
                    *self.reconnect_url.lock() = session.reconnect_url;
                    return Ok(SessionEnd::Reconnect);
                }
                ServerMessage::Revocation {
                    subscription_type,
                    status,
                } => {
                    log::warn!(
                        "[EventStream:{}] Subscription {} revoked: {}",
                        self.identity,
                        subscription_type,
                        status
                    );
                }
                ServerMessage::Unknown(kind) => {
                    log::debug!("[EventStream:{}] Unknown message type {}", self.identity, kind);
                }
            }
        }
    }

    /// Creates every subscription for `session_id`. Individual failures are
    /// logged and the session continues with whatever succeeded.
    async fn subscribe_all(&self, ctx: &SessionContext, session_id: &str) {
        let mut failed = 0usize;
        for request in &ctx.subscriptions {
            match self
                .helix
                .create_subscription(&ctx.token, session_id, request)
                .await
            {
                Ok(()) => log::debug!("[EventStream:{}] Subscribed to {}", self.identity, request.kind),
                Err(e) => {
                    failed += 1;
                    log::error!(
                        "[EventStream:{}] Failed to subscribe to {}: {}",
                        self.identity,
                        request.kind,
                        e
                    );
                }
            }
        }

        if !ctx.subscriptions.is_empty() && failed == ctx.subscriptions.len() {
            log::error!(
                "[EventStream:{}] No subscriptions active. Refresh the token and restart",
                self.identity
            );
            self.set_status(SubscriptionStatus::Errored);
            return;
        }
        if failed > 0 {
            log::warn!(
                "[EventStream:{}] Running degraded: {} of {} subscriptions failed",
                self.identity,
                failed,
                ctx.subscriptions.len()
            );
        } else {
            log::info!("[EventStream:{}] Listening to chat events", self.identity);
        }
        self.set_status(SubscriptionStatus::Subscribed);
    }

    async fn refresh_stream_online(&self, ctx: &SessionContext) {
        match self.helix.stream_is_live(&ctx.token, &ctx.broadcaster_id).await {
            Ok(online) => {
                if self.connection.set_stream_online(online) {
                    self.emitter.emit_status(self.connection.snapshot());
                }
                log::info!(
                    "[EventStream:{}] Stream is {}",
                    self.identity,
                    if online { "online" } else { "offline" }
                );
            }
            Err(e) => log::warn!("[EventStream:{}] Stream status query failed: {}", self.identity, e),
        }
    }

    fn set_status(&self, status: SubscriptionStatus) {
        let previous = std::mem::replace(&mut *self.status.lock(), status);
        if previous == status {
            return;
        }
        log::debug!(
            "[EventStream:{}] {:?} -> {:?}",
            self.identity,
            previous,
            status
        );

        let connected = status == SubscriptionStatus::Subscribed;
        let changed = match self.identity {
            Identity::Main => self.connection.set_chat_connected(connected),
            Identity::Bot => self.connection.set_bot_connected(connected),
        };
        if changed {
            self.emitter.emit_status(self.connection.snapshot());
        }
    }
}
