//! Application services layer.
//!
//! This module contains the work that happens behind the control server:
//! turning uploads into queued tracks, and feeding queued tracks to the player.

pub mod ingest;
pub mod playback_loop;

pub use ingest::{stage_upload, IngestPipeline, IngestRequest, Queued};
pub use playback_loop::PlaybackLoop;
