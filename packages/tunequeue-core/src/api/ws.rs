//! WebSocket handler for control-panel subscribers.
//!
//! A subscriber receives a `SNAPSHOT` first and then every incremental event
//! published on the hub. Anything the client sends is ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;

use crate::api::AppState;
use crate::events::{BroadcastEvent, EventEmitter};
use crate::state::ConnectionState;

// ─────────────────────────────────────────────────────────────────────────────
// Frontend Guard (RAII cleanup)
// ─────────────────────────────────────────────────────────────────────────────

/// Counts a connected control panel for as long as it lives.
struct FrontendGuard {
    connection: Arc<ConnectionState>,
    emitter: Arc<dyn EventEmitter>,
}

impl FrontendGuard {
    fn join(connection: Arc<ConnectionState>, emitter: Arc<dyn EventEmitter>) -> Self {
        if connection.frontend_joined() {
            emitter.emit_status(connection.snapshot());
        }
        Self {
            connection,
            emitter,
        }
    }
}

impl Drop for FrontendGuard {
    fn drop(&mut self) {
        if self.connection.frontend_left() {
            self.emitter.emit_status(self.connection.snapshot());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Upgrades to a WebSocket and streams hub events.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn encode(event: &BroadcastEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            log::warn!("[WS] Failed to encode event: {}", e);
            None
        }
    }
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Joined before registering so the snapshot already counts this frontend.
    let _frontend = FrontendGuard::join(Arc::clone(&state.connection), Arc::clone(&state.emitter));

    let snapshot_state = state.clone();
    let mut subscription = state
        .hub
        .register(move || BroadcastEvent::Snapshot(snapshot_state.snapshot()));
    let cancel_token = subscription.cancel_token().clone();
    let id = subscription.id();

    log::info!("[WS] Control panel connected: {}", id);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", id);
                break;
            }
            event = subscription.recv() => {
                let Some(event) = event else {
                    log::info!("[WS] Subscriber {} dropped by hub", id);
                    break;
                };
                let Some(msg) = encode(&event) else { continue };
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    log::info!("[WS] Control panel disconnected: {}", id);
}
