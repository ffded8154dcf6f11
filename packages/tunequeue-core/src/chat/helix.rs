//! REST client for the chat platform: token validation, event subscriptions,
//! chat replies and stream liveness.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol_constants::{HELIX_BASE_URL, OAUTH_VALIDATE_URL};

/// Errors from the chat platform API.
#[derive(Debug, Error)]
pub enum HelixError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token is missing, expired or revoked.
    #[error("Access token rejected")]
    Unauthorized,

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {endpoint} response: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },

    /// The platform accepted the request but did not post the message.
    #[error("Chat message dropped: {0}")]
    MessageDropped(String),
}

pub type HelixResult<T> = Result<T, HelixError>;

/// Result of validating an access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub user_id: String,
    /// Seconds until the token expires. Zero for non-expiring tokens.
    #[serde(default)]
    pub expires_in: i64,
}

/// One event subscription to create for a websocket session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub kind: &'static str,
    pub broadcaster_user_id: String,
    /// Reading identity, required by chat message subscriptions.
    pub user_id: Option<String>,
}

impl SubscriptionRequest {
    fn body(&self, session_id: &str) -> Value {
        let mut condition = json!({ "broadcaster_user_id": self.broadcaster_user_id });
        if let Some(user_id) = &self.user_id {
            condition["user_id"] = json!(user_id);
        }
        json!({
            "type": self.kind,
            "version": "1",
            "condition": condition,
            "transport": { "method": "websocket", "session_id": session_id },
        })
    }
}

/// A reply to post in chat.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage<'a> {
    pub broadcaster_id: &'a str,
    pub sender_id: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_parent_message_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    #[serde(default)]
    is_sent: bool,
    #[serde(default)]
    drop_reason: Option<DropReason>,
}

#[derive(Debug, Deserialize)]
struct DropReason {
    #[serde(default)]
    message: String,
}

/// Chat platform REST client.
#[derive(Clone)]
pub struct HelixClient {
    http: Client,
    client_id: String,
    base_url: String,
    validate_url: String,
}

impl HelixClient {
    pub fn new(http: Client, client_id: impl Into<String>) -> Self {
        Self::with_urls(http, client_id, HELIX_BASE_URL, OAUTH_VALIDATE_URL)
    }

    pub fn with_urls(
        http: Client,
        client_id: impl Into<String>,
        base_url: impl Into<String>,
        validate_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            base_url: base_url.into(),
            validate_url: validate_url.into(),
        }
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header("Client-Id", self.client_id.as_str())
    }

    /// Checks a token and returns the account it belongs to.
    pub async fn validate(&self, token: &str) -> HelixResult<TokenInfo> {
        let response = self
            .http
            .get(&self.validate_url)
            .header("Authorization", format!("OAuth {}", token))
            .send()
            .await?;
        let response = check("oauth2/validate", response).await?;
        decode("oauth2/validate", response).await
    }

    /// Subscribes `session_id` to one event type.
    pub async fn create_subscription(
        &self,
        token: &str,
        session_id: &str,
        request: &SubscriptionRequest,
    ) -> HelixResult<()> {
        let builder = self
            .http
            .post(format!("{}/eventsub/subscriptions", self.base_url))
            .json(&request.body(session_id));
        let response = self.authorized(builder, token).send().await?;
        check("eventsub/subscriptions", response).await?;
        Ok(())
    }

    /// Posts a chat message.
    pub async fn send_chat_message(
        &self,
        token: &str,
        message: &OutgoingMessage<'_>,
    ) -> HelixResult<()> {
        let builder = self
            .http
            .post(format!("{}/chat/messages", self.base_url))
            .json(message);
        let response = self.authorized(builder, token).send().await?;
        let response = check("chat/messages", response).await?;
        let sent: DataList<SentMessage> = decode("chat/messages", response).await?;
        ensure_sent(sent)
    }

    /// `true` if `user_id` is currently streaming.
    pub async fn stream_is_live(&self, token: &str, user_id: &str) -> HelixResult<bool> {
        let builder = self
            .http
            .get(format!("{}/streams", self.base_url))
            .query(&[("user_id", user_id), ("type", "live")]);
        let response = self.authorized(builder, token).send().await?;
        let response = check("streams", response).await?;
        let streams: DataList<Value> = decode("streams", response).await?;
        Ok(!streams.data.is_empty())
    }
}

async fn check(endpoint: &'static str, response: Response) -> HelixResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(HelixError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HelixError::Status {
        endpoint,
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: for<'de> Deserialize<'de>>(
    endpoint: &'static str,
    response: Response,
) -> HelixResult<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| HelixError::Decode {
        endpoint,
        reason: e.to_string(),
    })
}

fn ensure_sent(sent: DataList<SentMessage>) -> HelixResult<()> {
    match sent.data.into_iter().next() {
        Some(SentMessage { is_sent: true, .. }) => Ok(()),
        Some(SentMessage { drop_reason, .. }) => Err(HelixError::MessageDropped(
            drop_reason.map(|r| r.message).unwrap_or_default(),
        )),
        None => Err(HelixError::MessageDropped("empty response".into())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;
    use crate::chat::test_fixtures;

    #[test]
    fn chat_subscription_body_carries_reader() {
        let request = SubscriptionRequest {
            kind: "channel.chat.message",
            broadcaster_user_id: "100".into(),
            user_id: Some("300".into()),
        };
        let body = request.body("sess-1");
        assert_eq!(body["type"], "channel.chat.message");
        assert_eq!(body["version"], "1");
        assert_eq!(body["condition"]["broadcaster_user_id"], "100");
        assert_eq!(body["condition"]["user_id"], "300");
        assert_eq!(body["transport"]["method"], "websocket");
        assert_eq!(body["transport"]["session_id"], "sess-1");
    }

    #[test]
    fn stream_subscription_body_has_no_reader() {
        let request = SubscriptionRequest {
            kind: "stream.online",
            broadcaster_user_id: "100".into(),
            user_id: None,
        };
        assert!(request.body("s").get("condition").unwrap().get("user_id").is_none());
    }

    #[test]
    fn outgoing_message_shape() {
        let message = OutgoingMessage {
            broadcaster_id: "100",
            sender_id: "300",
            message: "Added song",
            reply_parent_message_id: Some("abc"),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["reply_parent_message_id"], "abc");

        let message = OutgoingMessage {
            reply_parent_message_id: None,
            ..message
        };
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("reply_parent_message_id").is_none());
    }

    #[test]
    fn dropped_messages_are_errors() {
        let sent: DataList<SentMessage> =
            serde_json::from_str(r#"{"data":[{"message_id":"1","is_sent":true}]}"#).unwrap();
        assert!(ensure_sent(sent).is_ok());

        let dropped: DataList<SentMessage> = serde_json::from_str(
            r#"{"data":[{"message_id":"","is_sent":false,"drop_reason":{"code":"msg_duplicate","message":"duplicate"}}]}"#,
        )
        .unwrap();
        match ensure_sent(dropped) {
            Err(HelixError::MessageDropped(reason)) => assert_eq!(reason, "duplicate"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn token_info_decodes() {
        let info: TokenInfo = serde_json::from_str(
            r#"{"client_id":"c","login":"streamer","scopes":[],"user_id":"100","expires_in":5000}"#,
        )
        .unwrap();
        assert_eq!(info.login, "streamer");
        assert_eq!(info.user_id, "100");
        assert_eq!(info.expires_in, 5000);
    }

    #[tokio::test]
    async fn stream_liveness_is_queried_by_user() {
        let app = Router::new().route(
            "/streams",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let live = params.get("user_id").map(String::as_str) == Some("100")
                    && params.get("type").map(String::as_str) == Some("live");
                let data = if live { json!([{ "id": "s1" }]) } else { json!([]) };
                Json(json!({ "data": data }))
            }),
        );
        let base = test_fixtures::serve(app).await;
        let helix = HelixClient::with_urls(Client::new(), "client-id", base.clone(), base);

        assert!(helix.stream_is_live("token", "100").await.unwrap());
        assert!(!helix.stream_is_live("token", "200").await.unwrap());
    }
}
