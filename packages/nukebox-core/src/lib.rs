//! NukeBox Core - shared library for the NukeBox network jukebox.
//!
//! Clients on the local network find the server over UDP, register, and
//! upload audio files over a framed TCP control channel. Each upload is
//! tagged, given cover art, placed in the library and queued; a background
//! loop plays the queue in order through an external player.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`protocol`]: Control channel frames and message types
//! - [`server`]: Control server, per-connection session, discovery, art HTTP
//! - [`services`]: Ingest pipeline and playback loop
//! - [`queue`]: The shared FIFO with its current/next summary
//! - [`media`]: Tag reading, metadata resolution, playback
//! - [`catalog`]: Persistent users and tracks
//! - [`runtime`]: Bounded worker pool
//! - [`events`]: Domain events for observers
//! - [`context`]: Advertise IP and art URL building
//! - [`state`]: Configuration and shared runtime flags
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! Collaborators sit behind traits so the pipeline and loop can run against
//! fakes:
//!
//! - [`TagReader`](media::TagReader): Embedded tag extraction
//! - [`Resolver`](media::Resolver): Artist/album identity and cover art
//! - [`Player`](media::Player): Audio output
//! - [`Catalog`](catalog::Catalog): User and track persistence
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`IpDetector`](context::IpDetector): Local IP detection

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod catalog;
pub mod context;
pub mod error;
pub mod events;
pub mod media;
pub mod protocol;
pub mod protocol_constants;
pub mod queue;
pub mod runtime;
pub mod server;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use catalog::{Catalog, JsonCatalog, StoredTrack, StoredUser, TrackRecord};
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{
    ErrorCode, MetadataError, NukeboxError, NukeboxResult, PersistenceError, PlayerError,
    ProtocolError, QueueError, ServerError, TransferError,
};
pub use events::{
    BroadcastEventBridge, ClientEvent, EventEmitter, LoggingEventEmitter, NoopEventEmitter,
    NukeboxEvent, PlaybackEvent, QueueEvent,
};
pub use queue::{ArtRef, Entry, QueueSnapshot, Summary, TrackQueue};
pub use runtime::WorkerPool;
pub use state::{Config, LibraryPaths, PlaybackStatus, ResolverKind};
pub use utils::now_millis;

// Re-export bootstrap types
pub use bootstrap::{
    bootstrap_services, bootstrap_services_with_network, BootstrappedServices, RunningServer,
};
