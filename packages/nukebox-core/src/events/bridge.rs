//! Bridge implementation that maps domain events to a broadcast channel.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between domain services
//! and whoever wants to observe them, forwarding typed events to a
//! `tokio::sync::broadcast` channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{ClientEvent, NukeboxEvent, PlaybackEvent, QueueEvent};

/// Bridges domain events to a broadcast channel.
///
/// An optional external emitter (e.g. [`super::LoggingEventEmitter`]) also
/// receives every event; it can be set after construction.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<NukeboxEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that sees every event before broadcast.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<NukeboxEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(NukeboxEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_queue, QueueEvent, Queue);
    impl_emit!(emit_playback, PlaybackEvent, Playback);
    impl_emit!(emit_client, ClientEvent, Client);
}

#[cfg(test)]
mod tests {
    use super::super::emitter::test_support::RecordingEmitter;
    use super::*;

    #[tokio::test]
    async fn subscribers_and_external_emitter_both_receive() {
        let bridge = BroadcastEventBridge::new(8);
        let recorder = Arc::new(RecordingEmitter::default());
        bridge.set_external_emitter(recorder.clone());
        let mut rx = bridge.subscribe();

        bridge.emit_queue(QueueEvent::Drained { timestamp: 5 });

        match rx.recv().await.unwrap() {
            NukeboxEvent::Queue(QueueEvent::Drained { timestamp }) => assert_eq!(timestamp, 5),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(recorder.queue.lock().len(), 1);
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_client(ClientEvent::Disconnected {
            connection_id: 1,
            timestamp: 0,
        });
    }
}
