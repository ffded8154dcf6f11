//! Sends plain-text replies to chat commands.

use std::sync::Arc;

use async_trait::async_trait;

use super::credentials::{CredentialStore, Identity};
use super::helix::{HelixClient, OutgoingMessage};
use super::types::ChatMessage;

/// Where a reply goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyTarget {
    pub broadcaster_id: String,
    /// Broadcaster login, used to address manual-fix notices.
    pub broadcaster_login: String,
    /// Message being replied to.
    pub reply_to: Option<String>,
}

impl ReplyTarget {
    pub fn for_message(message: &ChatMessage) -> Self {
        Self {
            broadcaster_id: message.broadcaster_user_id.clone(),
            broadcaster_login: message.broadcaster_user_login.clone(),
            reply_to: Some(message.message_id.clone()).filter(|id| !id.is_empty()),
        }
    }
}

/// Sends replies. Delivery failures are the replier's problem; callers never
/// see them.
#[async_trait]
pub trait ChatReplier: Send + Sync {
    async fn reply(&self, target: &ReplyTarget, text: &str);
}

/// Replies through the chat platform API as the bot when it is
/// authenticated, otherwise as the broadcaster.
pub struct HelixReplier {
    helix: HelixClient,
    credentials: Arc<dyn CredentialStore>,
}

impl HelixReplier {
    pub fn new(helix: HelixClient, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { helix, credentials }
    }

    /// Token and user id of the identity that should send replies.
    fn sender(&self) -> Option<(String, String)> {
        select_sender(self.credentials.as_ref())
    }
}

fn select_sender(credentials: &dyn CredentialStore) -> Option<(String, String)> {
    [Identity::Bot, Identity::Main]
        .into_iter()
        .find_map(|identity| {
            let account = credentials.account(identity)?;
            let token = credentials.token(identity)?;
            Some((token, account.user_id))
        })
}

#[async_trait]
impl ChatReplier for HelixReplier {
    async fn reply(&self, target: &ReplyTarget, text: &str) {
        let Some((token, sender_id)) = self.sender() else {
            log::warn!("[Reply] No authenticated account, dropping reply: {}", text);
            return;
        };
        let message = OutgoingMessage {
            broadcaster_id: &target.broadcaster_id,
            sender_id: &sender_id,
            message: text,
            reply_parent_message_id: target.reply_to.as_deref(),
        };
        match self.helix.send_chat_message(&token, &message).await {
            Ok(()) => log::debug!("[Reply] Sent: {}", text),
            Err(e) => log::error!("[Reply] Failed to send \"{}\": {}", text, e),
        }
    }
}
