//! Durable, best-effort log of accepted song requests.
//!
//! Records are appended as JSON lines. Writes happen on background tasks and
//! failures never reach chat.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::player::types::TrackInfo;

/// File name of the history log inside the data directory.
pub const HISTORY_FILE: &str = "song_requests.jsonl";

/// Errors that can occur while persisting history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode history record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub video_id: String,
    pub title: String,
    pub artist: String,
    pub image_url: String,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(track: &TrackInfo, requested_by: &str) -> Self {
        Self {
            video_id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            image_url: track.image_url.clone(),
            requested_by: requested_by.to_string(),
            requested_at: Utc::now(),
        }
    }
}

/// Sink for request history.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError>;
}

/// Appends records to a JSON-lines file.
pub struct JsonlHistory {
    path: PathBuf,
    /// Serializes appends so concurrent records never interleave.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlHistory {
    /// History stored as [`HISTORY_FILE`] inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(HISTORY_FILE),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryRecorder for JsonlHistory {
    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Discards records. Used when no data directory is configured.
pub struct NoopHistory;

#[async_trait]
impl HistoryRecorder for NoopHistory {
    async fn record(&self, _record: HistoryRecord) -> Result<(), HistoryError> {
        Ok(())
    }
}
