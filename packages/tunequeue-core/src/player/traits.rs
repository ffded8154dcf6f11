//! Trait abstraction for the external player.
//!
//! Services depend on [`PlayerApi`] rather than the HTTP client so queue
//! synchronization and command handling can be exercised against mocks.

use async_trait::async_trait;

use super::client::PlayerResult;
use super::types::{QueueSnapshot, TrackInfo};

/// Operations the core performs against the player.
#[async_trait]
pub trait PlayerApi: Send + Sync {
    /// Reads the currently loaded track. `None` when nothing is loaded.
    async fn current_track(&self) -> PlayerResult<Option<TrackInfo>>;

    /// Reads the full queue, including already-played entries.
    async fn queue(&self) -> PlayerResult<QueueSnapshot>;

    /// Inserts `video_id` directly after the selected entry.
    async fn enqueue_after_current(&self, video_id: &str) -> PlayerResult<()>;

    /// Moves the entry at index `from` so that it ends up at index `to`.
    ///
    /// # Arguments
    /// * `from` - Current index of the entry in the player's queue
    /// * `to` - Index the entry occupies after the move
    async fn move_queue_item(&self, from: usize, to: usize) -> PlayerResult<()>;

    /// Advances to the next entry.
    async fn skip(&self) -> PlayerResult<()>;
}
