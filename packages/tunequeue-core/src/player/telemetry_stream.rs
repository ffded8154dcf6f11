//! Reconnecting WebSocket feed of player telemetry.
//!
//! Raw frames are pushed, in arrival order, into a bounded channel that has a
//! single consumer (the state tracker). Decoding happens on the consumer side
//! so this task never drops a frame it does not understand.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::events::EventEmitter;
use crate::state::ConnectionState;

/// How a connected session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown was requested.
    Cancelled,
    /// The consumer went away; nothing left to feed.
    ConsumerGone,
    /// The player closed the socket or the read failed.
    Disconnected,
}

/// Keeps a telemetry connection to the player alive.
pub struct TelemetryStream {
    url: String,
    reconnect_delay: Duration,
    connection: Arc<ConnectionState>,
    emitter: Arc<dyn EventEmitter>,
}

impl TelemetryStream {
    pub fn new(
        url: String,
        reconnect_delay: Duration,
        connection: Arc<ConnectionState>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            url,
            reconnect_delay,
            connection,
            emitter,
        }
    }

    /// Connects, forwards frames into `tx`, and reconnects after
    /// `reconnect_delay` until `cancel` fires or the receiver is dropped.
    pub async fn run(self, tx: mpsc::Sender<Bytes>, cancel: CancellationToken) {
        log::info!("[Telemetry] Starting feed from {}", self.url);

        loop {
            let connect = tokio::select! {
                _ = cancel.cancelled() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match connect {
                Ok((socket, _response)) => {
                    log::info!("[Telemetry] Connected to player");
                    self.set_connected(true);
                    let end = Self::pump(socket, &tx, &cancel).await;
                    self.set_connected(false);

                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::ConsumerGone => {
                            log::warn!("[Telemetry] Consumer dropped, stopping feed");
                            return;
                        }
                        SessionEnd::Disconnected => {
                            log::warn!(
                                "[Telemetry] Player connection lost, retrying in {:?}",
                                self.reconnect_delay
                            );
                        }
                    }
                }
                Err(e) => {
                    log::debug!("[Telemetry] Connect failed: {}", e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        log::info!("[Telemetry] Feed stopped");
    }

    async fn pump<S>(mut socket: S, tx: &mpsc::Sender<Bytes>, cancel: &CancellationToken) -> SessionEnd
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                frame = socket.next() => frame,
            };

            let payload = match frame {
                Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_bytes()),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    log::warn!("[Telemetry] Read error: {}", e);
                    return SessionEnd::Disconnected;
                }
            };

            if tx.send(payload).await.is_err() {
                return SessionEnd::ConsumerGone;
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        if self.connection.set_player_connected(connected) {
            self.emitter.emit_status(self.connection.snapshot());
        }
    }
}
