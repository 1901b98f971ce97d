//! Centralized error types for the NukeBox core library.
//!
//! Each concern gets its own `thiserror` enum so call sites can decide how
//! far an error travels:
//!
//! - [`FramingError`] closes the connection it occurred on, as does an upload
//!   overflow (both surface as [`SessionError`])
//! - [`ProtocolError`] is logged and the message dropped
//! - [`TransferError`], [`MetadataError`] and [`PersistenceError`] are caught
//!   where they happen and logged; otherwise none of them tear down a
//!   connection
//! - [`QueueError`] is resolved by resetting the queue summary
//!
//! [`NukeboxError`] unifies them for bootstrap and the binary.

use std::io;

use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Codes appear in logs next to the message and let callers branch on the
/// kind of failure without matching on variants.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

/// Byte-level framing of the control channel is broken.
///
/// The stream can no longer be resynchronised, so the connection is closed.
#[derive(Debug, Error)]
pub enum FramingError {
    /// A frame header announced a zero-length body.
    #[error("Empty control frame")]
    EmptyFrame,

    /// A frame header announced a body larger than the allowed maximum.
    #[error("Control frame of {len} bytes exceeds limit of {max} bytes")]
    Oversized { len: usize, max: usize },
}

impl ErrorCode for FramingError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyFrame => "empty_frame",
            Self::Oversized { .. } => "frame_too_large",
        }
    }
}

/// A decoded message is not valid for the session's current state or mode.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame body is not a JSON object we understand.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Anything other than a registration arrived before registration.
    #[error("Client must register with name and mac_id first")]
    NotRegistered,

    /// A request carried an unknown `func`.
    #[error("Unknown request: {0}")]
    UnknownRequest(String),

    /// An upload announce declared a non-positive size.
    #[error("Invalid upload size: {0}")]
    InvalidSize(i64),

    /// An upload announce declared more bytes than the server accepts.
    #[error("Upload of {size} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge { size: u64, limit: u64 },
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_message",
            Self::NotRegistered => "not_registered",
            Self::UnknownRequest(_) => "unknown_request",
            Self::InvalidSize(_) => "invalid_upload_size",
            Self::UploadTooLarge { .. } => "upload_too_large",
        }
    }
}

/// An upload could not be buffered, staged or placed.
#[derive(Debug, Error)]
pub enum TransferError {
    /// More bytes were offered to an upload buffer than it declared.
    #[error("Upload overflow: declared {declared} bytes, got {attempted}")]
    Overflow { declared: u64, attempted: u64 },

    /// Writing the staged upload failed.
    #[error("Failed to write staged upload: {0}")]
    Stage(#[source] io::Error),

    /// Moving the staged upload into the library failed.
    #[error("Failed to move upload into library: {0}")]
    Place(#[source] io::Error),

    /// Writing cover art into the art directory failed.
    #[error("Failed to write cover art: {0}")]
    Art(#[source] io::Error),
}

impl ErrorCode for TransferError {
    fn code(&self) -> &'static str {
        match self {
            Self::Overflow { .. } => "upload_overflow",
            Self::Stage(_) => "stage_failed",
            Self::Place(_) => "place_failed",
            Self::Art(_) => "art_write_failed",
        }
    }
}

/// A connection session hit a condition it cannot recover from.
///
/// Either variant closes the connection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Framing(e) => e.code(),
            Self::Transfer(e) => e.code(),
        }
    }
}

/// Track metadata could not be extracted or resolved.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The tag reader could not open or parse the file.
    #[error("Failed to read tags: {0}")]
    TagRead(String),

    /// A required field is absent from both embedded and declared tags.
    #[error("Missing required tag: {0}")]
    MissingField(&'static str),

    /// The resolver request failed.
    #[error("Resolver request failed: {0}")]
    Resolver(String),

    /// The resolver found nothing usable for the query.
    #[error("No match for {artist} - {album}")]
    NoMatch { artist: String, album: String },
}

impl ErrorCode for MetadataError {
    fn code(&self) -> &'static str {
        match self {
            Self::TagRead(_) => "tag_read_failed",
            Self::MissingField(_) => "missing_tag",
            Self::Resolver(_) => "resolver_failed",
            Self::NoMatch { .. } => "resolver_no_match",
        }
    }
}

impl From<reqwest::Error> for MetadataError {
    fn from(err: reqwest::Error) -> Self {
        Self::Resolver(err.to_string())
    }
}

/// Queue operation could not be satisfied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Dequeue was called on an empty queue.
    #[error("Queue is empty")]
    Empty,
}

/// Catalog write or read failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the catalog file failed.
    #[error("Catalog I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The catalog file could not be (de)serialized.
    #[error("Catalog serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The catalog worker was dropped before completing.
    #[error("Catalog task failed: {0}")]
    Task(String),
}

/// The audio player could not start or track playback.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player process could not be spawned.
    #[error("Failed to start player: {0}")]
    Spawn(#[source] io::Error),

    /// No player command is configured.
    #[error("Player command is empty")]
    NoCommand,
}

/// A listener could not be started.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or configure a socket.
    #[error("Failed to bind {service} on port {port}: {source}")]
    Bind {
        service: &'static str,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The HTTP service stopped with an error.
    #[error("Art service failed: {0}")]
    Serve(#[source] io::Error),
}

/// Application-wide error type for bootstrap and top-level operations.
#[derive(Debug, Error)]
pub enum NukeboxError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error(transparent)]
    Server(#[from] ServerError),

    /// Network-related error (bind failures, IP detection).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error (task join failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorCode for NukeboxError {
    fn code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.code(),
            Self::Transfer(e) => e.code(),
            Self::Metadata(e) => e.code(),
            Self::Queue(_) => "queue_empty",
            Self::Persistence(_) => "persistence_failed",
            Self::Player(_) => "player_failed",
            Self::Server(_) => "server_failed",
            Self::Network(_) => "network_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type NukeboxResult<T> = Result<T, NukeboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_size_error_returns_correct_code() {
        let err = ProtocolError::InvalidSize(0);
        assert_eq!(err.code(), "invalid_upload_size");
        assert_eq!(err.to_string(), "Invalid upload size: 0");
    }

    #[test]
    fn wrapped_errors_keep_inner_code() {
        let err: NukeboxError = MetadataError::MissingField("title").into();
        assert_eq!(err.code(), "missing_tag");
        assert_eq!(err.to_string(), "Missing required tag: title");
    }

    #[test]
    fn overflow_reports_both_sizes() {
        let err = TransferError::Overflow {
            declared: 10,
            attempted: 12,
        };
        assert_eq!(err.code(), "upload_overflow");
        assert!(err.to_string().contains("declared 10"));
    }
}
