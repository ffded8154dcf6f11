//! HTTP route handlers.
//!
//! All handlers are thin: they read from services and never touch the
//! player queue.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{TunequeueError, TunequeueResult};
use crate::player::TrackInfo;
use crate::protocol_constants::SERVICE_ID;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/player/current", get(get_current_track))
        .route("/api/v1/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Everything the control panel renders, in one read.
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.snapshot())
}

/// Reads the current track straight from the player rather than the tracker.
async fn get_current_track(State(state): State<AppState>) -> TunequeueResult<Json<TrackInfo>> {
    match state.player.current_track().await? {
        Some(track) => Ok(Json(track)),
        None => Err(TunequeueError::NotFound("Nothing is playing".into())),
    }
}
