//! Bridge implementation that maps service events onto the broadcast hub.
//!
//! The [`HubEventBridge`] lives at the boundary between services and the
//! control-panel transport. It can also forward to an optional external
//! emitter (for example a logging emitter while debugging).

use std::sync::Arc;

use parking_lot::RwLock;

use super::emitter::EventEmitter;
use super::hub::BroadcastHub;
use super::{BroadcastEvent, ChannelStatus, QueueView};
use crate::player::types::PlayerState;
use crate::state::ConnectionStatus;

/// Forwards emitted events to every hub subscriber.
#[derive(Clone)]
pub struct HubEventBridge {
    hub: Arc<BroadcastHub>,
    /// Optional external emitter, settable after construction.
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl HubEventBridge {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self {
            hub,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an additional emitter that sees every event before the hub does.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then publishes to the hub.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            let delivered = self.hub.publish(BroadcastEvent::$variant(event));
            log::trace!(
                "[EventBridge] {} delivered to {} subscriber(s)",
                stringify!($variant),
                delivered
            );
        }
    };
}

impl EventEmitter for HubEventBridge {
    impl_emit!(emit_player, PlayerState, PlayerState);
    impl_emit!(emit_status, ConnectionStatus, ConnectionStatus);
    impl_emit!(emit_queue, QueueView, QueueUpdated);
    impl_emit!(emit_channel, ChannelStatus, ChannelStatus);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Snapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmitter(AtomicUsize);

    impl EventEmitter for CountingEmitter {
        fn emit_player(&self, _state: PlayerState) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn emit_status(&self, _status: ConnectionStatus) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn emit_queue(&self, _view: QueueView) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn emit_channel(&self, _status: ChannelStatus) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn forwards_to_hub_and_external() {
        let hub = Arc::new(BroadcastHub::new(8));
        let bridge = HubEventBridge::new(Arc::clone(&hub));
        let external = Arc::new(CountingEmitter(AtomicUsize::new(0)));
        bridge.set_external_emitter(external.clone());

        let mut sub = hub.register(|| {
            BroadcastEvent::Snapshot(Snapshot {
                player: PlayerState::default(),
                status: ConnectionStatus::default(),
                queue: QueueView::default(),
                channel: ChannelStatus::default(),
            })
        });
        bridge.emit_queue(QueueView::default());

        assert_eq!(external.0.load(Ordering::SeqCst), 1);
        sub.recv().await.unwrap();
        let event = sub.recv().await.unwrap();
        assert!(matches!(*event, BroadcastEvent::QueueUpdated(_)));
    }
}
