//! HTTP client for the player's local REST API.
//!
//! Every call is a single request/response. A non-success status is always an
//! error and nothing is retried here; callers decide what to do.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use super::traits::PlayerApi;
use super::types::{PlayerSong, QueueSnapshot, TrackInfo};
use crate::protocol_constants::{
    INSERT_AFTER_CURRENT_VIDEO, PLAYER_NEXT_PATH, PLAYER_QUEUE_PATH, PLAYER_SEARCH_PATH,
    PLAYER_SONG_PATH, PLAYER_TELEMETRY_PATH,
};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors returned by the player API.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Transport failure (connection refused, timeout, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The player answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },

    /// The body could not be decoded.
    #[error("Failed to decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Convenient Result alias for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

impl PlayerError {
    /// Returns true if a later attempt may succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            PlayerError::Http(e) => e.is_timeout() || e.is_connect(),
            PlayerError::HttpStatus { status, .. } => *status >= 500,
            PlayerError::Decode { .. } => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// [`PlayerApi`] implementation over HTTP.
#[derive(Clone)]
pub struct PlayerClient {
    http: Client,
    host: String,
}

impl PlayerClient {
    /// Creates a client for the player at `host` (`ip:port`).
    ///
    /// The shared `http` client carries the request timeout.
    pub fn new(http: Client, host: impl Into<String>) -> Self {
        Self {
            http,
            host: host.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.host, path)
    }

    /// WebSocket URL of the telemetry feed.
    pub fn telemetry_url(&self) -> String {
        format!("ws://{}{}", self.host, PLAYER_TELEMETRY_PATH)
    }

    /// Runs a search on the player and decodes the raw result into `T`.
    pub async fn search<T: DeserializeOwned>(&self, query: &str) -> PlayerResult<T> {
        let response = self
            .http
            .post(self.url(PLAYER_SEARCH_PATH))
            .json(&json!({ "query": query.trim() }))
            .send()
            .await?;
        let response = ensure_success(PLAYER_SEARCH_PATH, response)?;
        decode_json(PLAYER_SEARCH_PATH, response).await
    }
}

fn ensure_success(endpoint: &str, response: Response) -> PlayerResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PlayerError::HttpStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

async fn decode_json<T: DeserializeOwned>(endpoint: &str, response: Response) -> PlayerResult<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| PlayerError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl PlayerApi for PlayerClient {
    async fn current_track(&self) -> PlayerResult<Option<TrackInfo>> {
        let response = self.http.get(self.url(PLAYER_SONG_PATH)).send().await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = ensure_success(PLAYER_SONG_PATH, response)?;
        let song: PlayerSong = decode_json(PLAYER_SONG_PATH, response).await?;
        if song.video_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(song.into()))
    }

    async fn queue(&self) -> PlayerResult<QueueSnapshot> {
        let response = self.http.get(self.url(PLAYER_QUEUE_PATH)).send().await?;
        let response = ensure_success(PLAYER_QUEUE_PATH, response)?;
        let body = response.bytes().await?;
        QueueSnapshot::from_json(&body).map_err(|e| PlayerError::Decode {
            endpoint: PLAYER_QUEUE_PATH.to_string(),
            reason: e.to_string(),
        })
    }

    async fn enqueue_after_current(&self, video_id: &str) -> PlayerResult<()> {
        let response = self
            .http
            .post(self.url(PLAYER_QUEUE_PATH))
            .json(&json!({
                "videoId": video_id,
                "insertPosition": INSERT_AFTER_CURRENT_VIDEO,
            }))
            .send()
            .await?;
        ensure_success(PLAYER_QUEUE_PATH, response)?;
        Ok(())
    }

    async fn move_queue_item(&self, from: usize, to: usize) -> PlayerResult<()> {
        let path = format!("{}/{}", PLAYER_QUEUE_PATH, from);
        let response = self
            .http
            .patch(self.url(&path))
            .json(&json!({ "toIndex": to }))
            .send()
            .await?;
        ensure_success(&path, response)?;
        Ok(())
    }

    async fn skip(&self) -> PlayerResult<()> {
        let response = self.http.post(self.url(PLAYER_NEXT_PATH)).send().await?;
        ensure_success(PLAYER_NEXT_PATH, response)?;
        Ok(())
    }
}
