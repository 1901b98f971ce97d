//! Collaborators that touch media: tag reading, metadata resolution and
//! playback.
//!
//! Each sits behind a trait so ingest and playback can be tested with fakes.

pub mod player;
pub mod resolver;
pub mod tags;

pub use player::{CommandPlayer, Player};
pub use resolver::{MusicBrainzResolver, NullResolver, Resolution, Resolver};
pub use tags::{EmbeddedTags, LoftyTagReader, TagReader, TrackTags};
