//! Configuration and shared runtime state.
//!
//! [`Config`] is what the binary hands to bootstrap. [`PlaybackStatus`] is
//! the single flag shared between ingest (which reads it to place summaries)
//! and the playback loop (which owns it).

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_ART_PORT, DEFAULT_CONTROL_PORT, DEFAULT_DISCOVERY_PORT, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_PLAYBACK_POLL_MS, DEFAULT_PLAYER_STARTUP_GRACE_MS, DEFAULT_WORKER_THREADS,
};

/// Directory name used under the staging root and the music directory.
const APP_DIR_NAME: &str = "NukeBox2000";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which metadata resolver to use when a file carries no cover art.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    #[default]
    MusicBrainz,
    None,
}

/// Configuration for the NukeBox server.
///
/// All fields have sensible defaults; path fields left unset derive from
/// `library_dir`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Network
    /// TCP port of the control/upload channel.
    pub control_port: u16,

    /// UDP port of the discovery responder.
    pub discovery_port: u16,

    /// HTTP port of the cover-art service.
    pub art_port: u16,

    /// IP placed in art URLs. Detected from the interfaces when unset.
    pub advertise_ip: Option<IpAddr>,

    // Filesystem
    /// Where uploads are written before placement.
    pub staging_dir: PathBuf,

    /// Root of the music library.
    pub library_dir: PathBuf,

    /// Where cover art is written (default `<library_dir>/art`).
    pub art_dir: Option<PathBuf>,

    /// Catalog file (default `<library_dir>/catalog.json`).
    pub catalog_path: Option<PathBuf>,

    // Ingest
    /// Maximum number of concurrent ingest/persistence jobs.
    pub worker_threads: usize,

    /// Largest upload accepted (bytes).
    pub max_upload_bytes: u64,

    /// Metadata resolver backend.
    pub resolver: ResolverKind,

    // Playback
    /// Interval between playback loop iterations (milliseconds).
    pub playback_poll_ms: u64,

    /// Delay after starting a track before polling the player (milliseconds).
    pub player_startup_grace_ms: u64,

    /// Player program and arguments; the track path is appended.
    pub player_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            art_port: DEFAULT_ART_PORT,
            advertise_ip: None,
            staging_dir: std::env::temp_dir().join(APP_DIR_NAME),
            library_dir: default_library_dir(),
            art_dir: None,
            catalog_path: None,
            worker_threads: DEFAULT_WORKER_THREADS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            resolver: ResolverKind::default(),
            playback_poll_ms: DEFAULT_PLAYBACK_POLL_MS,
            player_startup_grace_ms: DEFAULT_PLAYER_STARTUP_GRACE_MS,
            player_command: default_player_command(),
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_threads == 0 {
            return Err("worker_threads must be >= 1".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be >= 1".to_string());
        }
        if self.playback_poll_ms == 0 {
            return Err("playback_poll_ms must be >= 1".to_string());
        }
        if self.player_command.first().map_or(true, |p| p.is_empty()) {
            return Err("player_command must name a program".to_string());
        }
        Ok(())
    }

    /// Resolves the on-disk layout from the configured directories.
    #[must_use]
    pub fn paths(&self) -> LibraryPaths {
        LibraryPaths {
            staging: self.staging_dir.clone(),
            library: self.library_dir.clone(),
            art: self
                .art_dir
                .clone()
                .unwrap_or_else(|| self.library_dir.join("art")),
        }
    }

    /// Returns the catalog file location.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.library_dir.join("catalog.json"))
    }
}

fn default_library_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join("Music").join(APP_DIR_NAME)
}

fn default_player_command() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Staging, library and art directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    pub staging: PathBuf,
    pub library: PathBuf,
    pub art: PathBuf,
}

impl LibraryPaths {
    /// Creates every directory that does not exist yet (mode 0755 on Unix).
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.staging, &self.library, &self.art] {
            create_dir(dir)?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755))?;
    }
    log::info!("[Config] Created directory {}", dir.display());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback Status
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a track is currently audible.
///
/// Written only by the playback loop.
#[derive(Debug, Default)]
pub struct PlaybackStatus {
    playing: AtomicBool,
}

impl PlaybackStatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }
}
