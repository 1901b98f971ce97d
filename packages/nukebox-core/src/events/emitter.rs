//! Event emitter abstraction for decoupling services from delivery.
//!
//! Services depend on the [`EventEmitter`] trait rather than a concrete
//! channel, so tests can count events and the binary can choose delivery.

use super::{ClientEvent, PlaybackEvent, QueueEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct PlaybackLoop {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl PlaybackLoop {
///     fn finished(&self, track: String) {
///         self.emitter.emit_playback(PlaybackEvent::TrackFinished { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a queue change event.
    fn emit_queue(&self, event: QueueEvent);

    /// Emits a playback lifecycle event.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a client connection event.
    fn emit_client(&self, event: ClientEvent);
}

/// No-op emitter for tests and minimal setups.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_queue(&self, _event: QueueEvent) {}

    fn emit_playback(&self, _event: PlaybackEvent) {}

    fn emit_client(&self, _event: ClientEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_queue(&self, event: QueueEvent) {
        tracing::debug!(?event, "queue_event");
    }

    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_client(&self, event: ClientEvent) {
        tracing::debug!(?event, "client_event");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Emitter that records everything it is given.
    #[derive(Default)]
    pub struct RecordingEmitter {
        pub queue: Mutex<Vec<QueueEvent>>,
        pub playback: Mutex<Vec<PlaybackEvent>>,
        pub client: Mutex<Vec<ClientEvent>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_queue(&self, event: QueueEvent) {
            self.queue.lock().push(event);
        }

        fn emit_playback(&self, event: PlaybackEvent) {
            self.playback.lock().push(event);
        }

        fn emit_client(&self, event: ClientEvent) {
            self.client.lock().push(event);
        }
    }
}
