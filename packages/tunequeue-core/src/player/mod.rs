//! External music player integration.
//!
//! The player exposes a local REST API for reads and queue mutations and a
//! WebSocket feed of playback telemetry.

pub mod client;
pub mod telemetry;
pub mod telemetry_stream;
pub mod traits;
pub mod types;

pub use client::{PlayerClient, PlayerError, PlayerResult};
pub use telemetry_stream::TelemetryStream;
pub use traits::PlayerApi;
pub use types::{PlayerState, QueueSnapshot, TrackInfo};
