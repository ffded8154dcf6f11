//! Keeps one chat identity connected.
//!
//! Every attempt re-validates the stored token, publishes the account details
//! and then runs an event-stream session. A failed or closed session is
//! followed by a fixed delay; a server-requested reconnect is not.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::credentials::{AccountInfo, CredentialStore, Identity};
use super::event_stream::{
    subscriptions_for, EventStreamClient, EventStreamError, SessionContext, SessionEnd,
};
use super::helix::{HelixClient, HelixError};
use super::types::ChatEvent;
use crate::events::{ChannelStatus, EventEmitter};
use crate::protocol_constants::TOKEN_EXPIRY_WARNING_DAYS;

/// Reconnect loop around an [`EventStreamClient`].
pub struct ChatSupervisor {
    client: EventStreamClient,
    helix: HelixClient,
    credentials: Arc<dyn CredentialStore>,
    emitter: Arc<dyn EventEmitter>,
    reward_id: Option<String>,
    reconnect_delay: Duration,
}

impl ChatSupervisor {
    pub fn new(
        client: EventStreamClient,
        helix: HelixClient,
        credentials: Arc<dyn CredentialStore>,
        emitter: Arc<dyn EventEmitter>,
        reward_id: Option<String>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            client,
            helix,
            credentials,
            emitter,
            reward_id,
            reconnect_delay,
        }
    }

    pub fn identity(&self) -> Identity {
        self.client.identity()
    }

    /// Runs until cancelled or until the chat event consumer goes away.
    ///
    /// Credential problems never end the loop: a missing or rejected token
    /// is retried after the reconnect delay.
    pub async fn run(self, tx: mpsc::Sender<ChatEvent>, cancel: CancellationToken) {
        let identity = self.identity();
        log::info!("[Chat:{}] Supervisor started", identity);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = match self.prepare().await {
                Ok(ctx) => self.client.run_session(&ctx, &tx, &cancel).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::ConsumerGone) => {
                    log::info!("[Chat:{}] Event consumer gone, stopping", identity);
                    break;
                }
                Ok(SessionEnd::Reconnect) => continue,
                // The store may receive a token later; keep polling quietly.
                Err(EventStreamError::MissingToken(_)) => {
                    log::debug!("[Chat:{}] No token available yet", identity)
                }
                Err(e) => log::warn!(
                    "[Chat:{}] Session ended: {}. Retrying in {:?}",
                    identity,
                    e,
                    self.reconnect_delay
                ),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        log::info!("[Chat:{}] Supervisor stopped", identity);
    }

    /// Validates the token and resolves what the next session subscribes to.
    async fn prepare(&self) -> Result<SessionContext, EventStreamError> {
        let identity = self.identity();
        let token = self
            .credentials
            .token(identity)
            .ok_or(EventStreamError::MissingToken(identity))?;

        let account = self.validate(identity, &token).await?;

        let broadcaster_id = match identity {
            Identity::Main => account.user_id.clone(),
            Identity::Bot => self
                .credentials
                .account(Identity::Main)
                .map(|main| main.user_id)
                .ok_or(EventStreamError::MissingBroadcaster)?,
        };
        let bot_configured = self.credentials.token(Identity::Bot).is_some();

        Ok(SessionContext {
            subscriptions: subscriptions_for(
                identity,
                &broadcaster_id,
                &account.user_id,
                bot_configured,
            ),
            token,
            broadcaster_id,
        })
    }

    async fn validate(&self, identity: Identity, token: &str) -> Result<AccountInfo, EventStreamError> {
        let info = match self.helix.validate(token).await {
            Ok(info) => info,
            Err(HelixError::Unauthorized) => {
                log::error!(
                    "[Chat:{}] Token rejected. Provide a new one",
                    identity
                );
                self.credentials.forget_account(identity);
                self.publish_accounts();
                return Err(HelixError::Unauthorized.into());
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let account = AccountInfo {
            identity,
            login: info.login,
            user_id: info.user_id,
            expires_at: (info.expires_in > 0)
                .then(|| now + chrono::Duration::seconds(info.expires_in)),
        };

        if account.expires_within(now, TOKEN_EXPIRY_WARNING_DAYS) {
            if let Some(expires_at) = account.expires_at {
                log::warn!(
                    "[Chat:{}] ALERT: token for {} expires {}. Generate a new one soon",
                    identity,
                    account.login,
                    expires_at.format("%Y-%m-%d")
                );
            }
        }
        log::info!("[Chat:{}] Authenticated as {}", identity, account.login);

        self.credentials.record_account(account.clone());
        self.publish_accounts();
        Ok(account)
    }

    fn publish_accounts(&self) {
        self.emitter.emit_channel(ChannelStatus {
            accounts: self.credentials.accounts(),
            reward_id: self.reward_id.clone(),
        });
    }
}
