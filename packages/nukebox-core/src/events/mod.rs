//! Domain events emitted by the queue, playback and connection layers.
//!
//! This module provides:
//! - [`EventEmitter`] trait for services to emit events
//! - [`BroadcastEventBridge`] for in-process subscribers
//! - Event types per domain (queue, playback, clients)

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::test_support::RecordingEmitter;

use serde::Serialize;

/// Every event the server emits, grouped by category.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum NukeboxEvent {
    Queue(QueueEvent),
    Playback(PlaybackEvent),
    Client(ClientEvent),
}

/// Changes to the pending-track queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    /// An upload finished ingest and was appended to the queue.
    TrackQueued {
        track: String,
        artist: String,
        /// Queue length right after insertion.
        position: usize,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The last queued track finished and the summary was cleared.
    Drained { timestamp: u64 },
}

/// Playback lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// The player was started on a track.
    TrackStarted {
        track: String,
        artist: String,
        path: String,
        timestamp: u64,
    },
    /// The player reported the track as done.
    TrackFinished { track: String, timestamp: u64 },
    /// A dequeued track could not be played.
    TrackSkipped {
        track: String,
        reason: String,
        timestamp: u64,
    },
}

/// Client connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    /// A connection registered with name and hardware id.
    Registered {
        #[serde(rename = "connectionId")]
        connection_id: u64,
        name: String,
        #[serde(rename = "macId")]
        mac_id: String,
        timestamp: u64,
    },
    /// A connection closed.
    Disconnected {
        #[serde(rename = "connectionId")]
        connection_id: u64,
        timestamp: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_category_and_type() {
        let event = NukeboxEvent::Queue(QueueEvent::TrackQueued {
            track: "Birch Tree".into(),
            artist: "Foals".into(),
            position: 2,
            timestamp: 7,
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "category": "queue",
                "type": "trackQueued",
                "track": "Birch Tree",
                "artist": "Foals",
                "position": 2,
                "timestamp": 7
            })
        );
    }

    #[test]
    fn client_event_uses_camel_case_ids() {
        let event = NukeboxEvent::Client(ClientEvent::Disconnected {
            connection_id: 3,
            timestamp: 1,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["connectionId"], 3);
        assert_eq!(value["type"], "disconnected");
    }
}
