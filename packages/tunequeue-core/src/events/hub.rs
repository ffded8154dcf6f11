//! Fan-out of state changes to UI subscribers.
//!
//! - `BroadcastHub`: registry of subscriber channels, publish never blocks
//! - `Subscription`: RAII handle that unregisters on drop
//!
//! Each subscriber owns a bounded channel. A subscriber whose buffer is full
//! (or whose receiver is gone) when an event is published is removed from
//! the registry on the spot; it is never retried.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::BroadcastEvent;

struct Registry {
    senders: HashMap<u64, mpsc::Sender<Arc<BroadcastEvent>>>,
    /// Bumped by every publish, under the registry lock.
    generation: u64,
}

/// Registry of UI subscribers.
pub struct BroadcastHub {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    buffer: usize,
    /// Cancelled by `close_all`, then replaced so later subscribers still work.
    close_token: RwLock<CancellationToken>,
}

impl BroadcastHub {
    /// Creates a hub whose subscribers each buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: Mutex::new(Registry {
                senders: HashMap::new(),
                generation: 0,
            }),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            close_token: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a subscriber whose first event is the output of `snapshot`.
    ///
    /// The snapshot is built without the registry lock held. If a publish
    /// slips in between building it and registering, the snapshot is rebuilt
    /// so the subscriber never misses an update that the snapshot predates.
    pub fn register<F>(self: &Arc<Self>, snapshot: F) -> Subscription
    where
        F: Fn() -> BroadcastEvent,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);

        loop {
            let seen = self.registry.lock().generation;
            let initial = Arc::new(snapshot());

            let mut registry = self.registry.lock();
            if registry.generation != seen {
                continue;
            }
            // Fresh channel with capacity >= 1: cannot be full.
            let _ = tx.try_send(initial);
            registry.senders.insert(id, tx);
            log::info!(
                "[Hub] Subscriber registered: {} (total: {})",
                id,
                registry.senders.len()
            );
            break;
        }

        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
            cancel_token: self.close_token.read().child_token(),
        }
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unregister(&self, id: u64) -> bool {
        let mut registry = self.registry.lock();
        let removed = registry.senders.remove(&id).is_some();
        if removed {
            log::info!(
                "[Hub] Subscriber unregistered: {} (remaining: {})",
                id,
                registry.senders.len()
            );
        }
        removed
    }

    /// Delivers `event` to every subscriber without waiting on any of them.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: impl Into<BroadcastEvent>) -> usize {
        let event = Arc::new(event.into());
        let targets: Vec<(u64, mpsc::Sender<Arc<BroadcastEvent>>)> = {
            let mut registry = self.registry.lock();
            registry.generation = registry.generation.wrapping_add(1);
            registry
                .senders
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!("[Hub] Subscriber {} is not keeping up, dropping it", id);
                    dropped.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    log::debug!("[Hub] Subscriber {} already closed", id);
                    dropped.push(id);
                }
            }
        }

        if !dropped.is_empty() {
            let mut registry = self.registry.lock();
            for id in dropped {
                registry.senders.remove(&id);
            }
        }

        delivered
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().senders.len()
    }

    /// Signals every current subscription to close.
    ///
    /// Returns the number of subscribers that were signalled.
    pub fn close_all(&self) -> usize {
        let count = self.subscriber_count();
        let mut token = self.close_token.write();
        token.cancel();
        *token = CancellationToken::new();
        if count > 0 {
            log::info!("[Hub] Closing {} subscriber(s)", count);
        }
        count
    }
}

/// A registered subscriber. Dropping it unregisters from the hub.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<BroadcastEvent>>,
    hub: Arc<BroadcastHub>,
    cancel_token: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the hub has dropped this subscriber and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<Arc<BroadcastEvent>> {
        self.rx.recv().await
    }

    /// Cancelled when the hub closes all subscribers.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
