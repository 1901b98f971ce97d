//! Control channel message types.
//!
//! Clients register first with `{name, mac_id}`, then send requests tagged by
//! `func`. Replies are plain JSON objects whose single top-level key tells the
//! client what it got (`progress`, `position`, `current`/`next`, `error`).

pub mod frame;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::queue::QueueSnapshot;

pub use frame::{encode_frame, FrameDecoder};

/// First message on every connection: who the client is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Registration {
    pub name: String,
    pub mac_id: String,
}

/// Tags a client declares alongside an upload.
///
/// Used to fill in fields the file's own tags lack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeclaredTags {
    #[serde(default, alias = "title")]
    pub track: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

/// Requests accepted from a registered client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "func", rename_all = "lowercase")]
pub enum Request {
    /// Announces an upload of exactly `size` raw bytes.
    File {
        filename: String,
        size: i64,
        #[serde(default)]
        tags: Option<DeclaredTags>,
    },
    /// Asks for the current/next summary.
    Query,
}

/// Parses a frame body as a registration.
pub fn parse_registration(body: &[u8]) -> Result<Registration, ProtocolError> {
    let value = parse_object(body)?;
    serde_json::from_value(value).map_err(|_| ProtocolError::NotRegistered)
}

/// Parses a frame body as a request from a registered client.
pub fn parse_request(body: &[u8]) -> Result<Request, ProtocolError> {
    let value = parse_object(body)?;
    let func = match value.get("func") {
        Some(Value::String(func)) => func.clone(),
        Some(other) => return Err(ProtocolError::UnknownRequest(other.to_string())),
        None => return Err(ProtocolError::Malformed("missing func".to_string())),
    };

    match func.as_str() {
        "file" | "query" => serde_json::from_value(value)
            .map_err(|e| ProtocolError::Malformed(format!("{func}: {e}"))),
        _ => Err(ProtocolError::UnknownRequest(func)),
    }
}

fn parse_object(body: &[u8]) -> Result<Value, ProtocolError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ProtocolError::Malformed("expected a JSON object".to_string()))
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Upload progress, 0..=100.
    Progress { progress: u8 },
    /// Where a finished upload landed in the queue.
    Position { position: String },
    /// Reply to a query.
    Queue(QueueSnapshot),
    /// An upload was received but could not be queued.
    Error { error: String },
}

impl ServerMessage {
    /// Builds the position reply for a queued track.
    #[must_use]
    pub fn position(track: &str, position: usize) -> Self {
        Self::Position {
            position: format!("Track {track}\nPosition: {position}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Summary;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn registration_requires_name_and_mac() {
        let reg = parse_registration(&body(json!({"name": "darren", "mac_id": "0987"}))).unwrap();
        assert_eq!(reg.name, "darren");
        assert_eq!(reg.mac_id, "0987");

        assert!(matches!(
            parse_registration(&body(json!({"name": "darren"}))),
            Err(ProtocolError::NotRegistered)
        ));
        assert!(matches!(
            parse_registration(&body(json!({"func": "query"}))),
            Err(ProtocolError::NotRegistered)
        ));
    }

    #[test]
    fn file_request_parses_with_and_without_tags() {
        let req = parse_request(&body(json!({
            "func": "file",
            "filename": "song.mp3",
            "size": 1000,
            "tags": {"title": "Birch Tree", "artist": "Foals"}
        })))
        .unwrap();
        assert_eq!(
            req,
            Request::File {
                filename: "song.mp3".to_string(),
                size: 1000,
                tags: Some(DeclaredTags {
                    track: Some("Birch Tree".to_string()),
                    artist: Some("Foals".to_string()),
                    ..Default::default()
                }),
            }
        );

        let req =
            parse_request(&body(json!({"func": "file", "filename": "a.mp3", "size": 5}))).unwrap();
        assert!(matches!(req, Request::File { tags: None, .. }));
    }

    #[test]
    fn unknown_func_is_reported() {
        assert!(matches!(
            parse_request(&body(json!({"func": "skip"}))),
            Err(ProtocolError::UnknownRequest(f)) if f == "skip"
        ));
    }

    #[test]
    fn non_object_body_is_malformed() {
        assert!(matches!(
            parse_request(b"[1,2]"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            parse_request(b"not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn server_messages_serialize_to_flat_objects() {
        assert_eq!(
            serde_json::to_value(ServerMessage::Progress { progress: 25 }).unwrap(),
            json!({"progress": 25})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::position("Birch Tree", 3)).unwrap(),
            json!({"position": "Track Birch Tree\nPosition: 3"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Error {
                error: "boom".into()
            })
            .unwrap(),
            json!({"error": "boom"})
        );
    }

    #[test]
    fn query_reply_has_current_and_next() {
        let snapshot = QueueSnapshot {
            current: Summary {
                track: "A".into(),
                artist: "B".into(),
                art: "http://x/a.jpeg".into(),
            },
            next: Summary::default(),
        };
        assert_eq!(
            serde_json::to_value(ServerMessage::Queue(snapshot)).unwrap(),
            json!({
                "current": {"track": "A", "artist": "B", "art": "http://x/a.jpeg"},
                "next": {"track": "", "artist": "", "art": ""}
            })
        );
    }
}
