//! Centralized error types for the Tunequeue core library.
//!
//! This module provides:
//! - [`ErrorKind`], the failure taxonomy services use to pick a reaction
//! - [`ErrorCode`], machine-readable codes for every module error
//! - [`TunequeueError`], the error returned by the control-panel API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::chat::event_stream::EventStreamError;
use crate::chat::helix::HelixError;
use crate::player::client::PlayerError;
use crate::search::SearchError;
use crate::services::history::HistoryError;
use crate::services::queue_synchronizer::{OrderingDefect, QueueError};

/// How a failure is handled.
///
/// Nothing in the core terminates the process. Only configuration errors at
/// startup are fatal, and those never reach this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or timeout failure; retried by the owning loop.
    Transient,
    /// A player call for one request failed; the requester gets a reply and
    /// only that submission is abandoned.
    RequestFatal,
    /// The song is queued but its position could not be confirmed or fixed.
    OrderingDefect,
    /// The requested song is already upcoming.
    Duplicate,
    /// The local queue mirror stopped matching the player and was cleared.
    Desynchronization,
    /// Input that should never occur, such as malformed telemetry. Logged and dropped.
    Malformed,
}

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses and logs.
    fn code(&self) -> &'static str;
}

impl ErrorCode for PlayerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "player_unreachable",
            Self::HttpStatus { .. } => "player_error_status",
            Self::Decode { .. } => "player_decode_failed",
        }
    }
}

impl ErrorCode for HelixError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "chat_api_unreachable",
            Self::Unauthorized => "chat_token_rejected",
            Self::Status { .. } => "chat_api_error_status",
            Self::Decode { .. } => "chat_api_decode_failed",
            Self::MessageDropped(_) => "chat_message_dropped",
        }
    }
}

impl ErrorCode for EventStreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "event_stream_websocket_error",
            Self::Closed => "event_stream_closed",
            Self::KeepaliveTimeout(_) => "event_stream_keepalive_timeout",
            Self::MissingToken(_) => "chat_token_missing",
            Self::MissingBroadcaster => "broadcaster_not_validated",
            Self::Helix(e) => e.code(),
        }
    }
}

impl ErrorCode for SearchError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "song_not_found",
            Self::DurationOutOfBounds { .. } => "song_duration_out_of_bounds",
            Self::Backend(e) => e.code(),
        }
    }
}

impl ErrorCode for QueueError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyQueued => "song_already_queued",
            Self::QueueUnavailable(_) => "queue_unavailable",
            Self::InsertFailed(_) => "insert_failed",
            Self::Cancelled => "submission_cancelled",
        }
    }
}

impl ErrorCode for OrderingDefect {
    fn code(&self) -> &'static str {
        match self {
            Self::Unconfirmed => "insert_unconfirmed",
            Self::MoveFailed(_) => "move_failed",
        }
    }
}

impl ErrorCode for HistoryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "history_io_failed",
            Self::Encode(_) => "history_encode_failed",
        }
    }
}

/// Application-wide error type for the Tunequeue control panel.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum TunequeueError {
    /// The external player could not be reached or answered badly.
    #[error("Player error: {0}")]
    Player(String),

    /// The chat platform API failed.
    #[error("Chat platform error: {0}")]
    ChatPlatform(String),

    /// Requested resource does not exist (e.g. nothing is playing).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TunequeueError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Player(_) => "player_error",
            Self::ChatPlatform(_) => "chat_platform_error",
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Player(_) | Self::ChatPlatform(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type TunequeueResult<T> = Result<T, TunequeueError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for TunequeueError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PlayerError> for TunequeueError {
    fn from(err: PlayerError) -> Self {
        Self::Player(err.to_string())
    }
}

impl From<HelixError> for TunequeueError {
    fn from(err: HelixError) -> Self {
        Self::ChatPlatform(err.to_string())
    }
}

impl From<HistoryError> for TunequeueError {
    fn from(err: HistoryError) -> Self {
        Self::Internal(err.to_string())
    }
}
