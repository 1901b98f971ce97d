//! Fixed protocol constants that should NOT be changed.
//!
//! These values are shared with deployed NukeBox clients; changing them
//! breaks compatibility with phones that already speak the protocol.

// ─────────────────────────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────────────────────────

/// TCP port for the control/upload channel.
pub const DEFAULT_CONTROL_PORT: u16 = 18008;

/// UDP port the discovery responder listens on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 19009;

/// HTTP port serving cover art.
pub const DEFAULT_ART_PORT: u16 = 8888;

// ─────────────────────────────────────────────────────────────────────────────
// Control Channel Framing
// ─────────────────────────────────────────────────────────────────────────────

/// Size of the big-endian length prefix in front of every control frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest control frame body accepted (bytes).
///
/// Control messages are small JSON records; anything larger means the peer
/// is sending raw data while we expect frames.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Read buffer size for connection sockets.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Capacity of each connection's outbound reply channel.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Value reported in the final progress reply of an upload.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Largest initial allocation for an upload buffer.
///
/// The buffer grows past this as bytes arrive; a client that announces a
/// huge size and then sends nothing should not pin that much memory.
pub const MAX_UPLOAD_PREALLOC: usize = 8 * 1024 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Datagram clients broadcast to find the server.
pub const DISCOVERY_PROBE: &[u8] = b"Hello Jukebox";

/// Reply sent back to a discovery probe.
pub const DISCOVERY_REPLY: &[u8] = b"This is the JukeBox Speaking. I'm Here";

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between playback loop iterations (milliseconds).
pub const DEFAULT_PLAYBACK_POLL_MS: u64 = 500;

/// Time the player gets to open media before we poll it (milliseconds).
pub const DEFAULT_PLAYER_STARTUP_GRACE_MS: u64 = 2000;

// ─────────────────────────────────────────────────────────────────────────────
// Ingest
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of concurrent ingest/persistence jobs.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default upper bound on a single upload (bytes).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// File extension used for cover art written to the art directory.
pub const ART_EXTENSION: &str = "jpeg";

/// Container type assumed when an upload's filename has no extension.
pub const DEFAULT_CONTAINER: &str = "mp3";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// User agent sent to the metadata resolver service.
pub const USER_AGENT: &str = concat!("nukebox/", env!("CARGO_PKG_VERSION"));

/// Capacity of the domain event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
