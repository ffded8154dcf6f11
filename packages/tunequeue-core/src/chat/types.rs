//! Chat event-stream wire types and the chat message model.
//!
//! Frames are `{"metadata": {...}, "payload": {...}}` envelopes. Only the
//! fields this crate acts on are modelled; everything else is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::protocol_constants::{
    SUB_CHAT_MESSAGE, SUB_REWARD_REDEMPTION, SUB_STREAM_OFFLINE, SUB_STREAM_ONLINE,
};

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Frame {
    metadata: FrameMetadata,
    #[serde(default)]
    payload: FramePayload,
}

#[derive(Debug, Deserialize)]
struct FrameMetadata {
    message_type: String,
    #[serde(default)]
    subscription_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FramePayload {
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    subscription: Option<SubscriptionInfo>,
    #[serde(default)]
    event: Option<Value>,
}

/// Session details from a welcome or reconnect frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub keepalive_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub reconnect_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SubscriptionInfo {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    status: String,
}

/// A decoded event-stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Welcome(Session),
    Keepalive,
    Notification {
        subscription_type: String,
        event: Value,
    },
    /// The server asks the client to move to `reconnect_url`.
    Reconnect(Session),
    Revocation {
        subscription_type: String,
        status: String,
    },
    /// Any other message type.
    Unknown(String),
}

impl ServerMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let frame: Frame = serde_json::from_str(raw)?;
        let payload = frame.payload;
        Ok(match frame.metadata.message_type.as_str() {
            "session_welcome" => ServerMessage::Welcome(payload.session.unwrap_or_default()),
            "session_keepalive" => ServerMessage::Keepalive,
            "session_reconnect" => ServerMessage::Reconnect(payload.session.unwrap_or_default()),
            "notification" => {
                let subscription_type = frame
                    .metadata
                    .subscription_type
                    .or_else(|| payload.subscription.as_ref().map(|s| s.kind.clone()))
                    .unwrap_or_default();
                ServerMessage::Notification {
                    subscription_type,
                    event: payload.event.unwrap_or(Value::Null),
                }
            }
            "revocation" => {
                let sub = payload.subscription.unwrap_or_default();
                ServerMessage::Revocation {
                    subscription_type: sub.kind,
                    status: sub.status,
                }
            }
            other => ServerMessage::Unknown(other.to_string()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat events
// ─────────────────────────────────────────────────────────────────────────────

/// A chat badge such as `moderator/1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Badge {
    pub set_id: String,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessageBody {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawChatMessage {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    broadcaster_user_id: String,
    #[serde(default)]
    broadcaster_user_login: String,
    #[serde(default)]
    chatter_user_id: String,
    #[serde(default)]
    chatter_user_login: String,
    #[serde(default)]
    message: MessageBody,
    #[serde(default)]
    badges: Vec<Badge>,
    #[serde(default)]
    channel_points_custom_reward_id: Option<String>,
}

/// An inbound chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub message_id: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub chatter_user_id: String,
    pub chatter_user_login: String,
    pub text: String,
    pub badges: Vec<Badge>,
    /// Channel-point reward this message redeemed, if any.
    pub reward_id: Option<String>,
}

impl From<RawChatMessage> for ChatMessage {
    fn from(raw: RawChatMessage) -> Self {
        Self {
            message_id: raw.message_id,
            broadcaster_user_id: raw.broadcaster_user_id,
            broadcaster_user_login: raw.broadcaster_user_login,
            chatter_user_id: raw.chatter_user_id,
            chatter_user_login: raw.chatter_user_login,
            text: raw.message.text,
            badges: raw.badges,
            reward_id: raw.channel_points_custom_reward_id.filter(|id| !id.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRedemption {
    #[serde(default)]
    user_login: String,
    #[serde(default)]
    user_input: String,
    #[serde(default)]
    reward: RawReward,
}

#[derive(Debug, Default, Deserialize)]
struct RawReward {
    #[serde(default)]
    id: String,
}

/// Events forwarded from the event stream to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatMessage),
    StreamOnline,
    StreamOffline,
    RewardRedeemed {
        user_login: String,
        reward_id: String,
        user_input: String,
    },
}

impl ChatEvent {
    /// Maps a notification to an event. `None` for subscription types this
    /// crate does not handle.
    pub fn from_notification(
        subscription_type: &str,
        event: Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        Ok(match subscription_type {
            SUB_CHAT_MESSAGE => {
                let raw: RawChatMessage = serde_json::from_value(event)?;
                Some(ChatEvent::Message(raw.into()))
            }
            SUB_STREAM_ONLINE => Some(ChatEvent::StreamOnline),
            SUB_STREAM_OFFLINE => Some(ChatEvent::StreamOffline),
            SUB_REWARD_REDEMPTION => {
                let raw: RawRedemption = serde_json::from_value(event)?;
                Some(ChatEvent::RewardRedeemed {
                    user_login: raw.user_login,
                    reward_id: raw.reward.id,
                    user_input: raw.user_input,
                })
            }
            _ => None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// Permissions derived from a chat message.
///
/// Broadcaster implies moderator and subscriber; moderator implies subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub is_broadcaster: bool,
    pub is_moderator: bool,
    pub is_subscriber: bool,
}

impl Capabilities {
    pub fn of(message: &ChatMessage) -> Self {
        let mut caps = Capabilities::default();
        if !message.chatter_user_id.is_empty()
            && message.chatter_user_id == message.broadcaster_user_id
        {
            caps.is_broadcaster = true;
        }
        for badge in &message.badges {
            match badge.set_id.as_str() {
                "broadcaster" => caps.is_broadcaster = true,
                "moderator" | "lead_moderator" => caps.is_moderator = true,
                "subscriber" | "founder" => caps.is_subscriber = true,
                _ => {}
            }
        }
        if caps.is_broadcaster {
            caps.is_moderator = true;
        }
        if caps.is_moderator {
            caps.is_subscriber = true;
        }
        caps
    }
}
