//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nukebox_core::ResolverKind;
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
///
/// Unset fields fall back to the core defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port of the control channel.
    /// Override: `NUKEBOX_CONTROL_PORT`
    pub control_port: u16,

    /// UDP port of the discovery responder.
    /// Override: `NUKEBOX_DISCOVERY_PORT`
    pub discovery_port: u16,

    /// TCP port of the cover-art HTTP service.
    /// Override: `NUKEBOX_ART_PORT`
    pub art_port: u16,

    /// IP address put into cover-art URLs. Auto-detected if unset.
    /// Override: `NUKEBOX_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Where uploads are written while they are ingested.
    /// Override: `NUKEBOX_STAGING_DIR`
    pub staging_dir: Option<PathBuf>,

    /// Where ingested tracks live.
    /// Override: `NUKEBOX_LIBRARY_DIR`
    pub library_dir: Option<PathBuf>,

    /// Where cover art is written. Defaults to `<library_dir>/art`.
    pub art_dir: Option<PathBuf>,

    /// Catalog file. Defaults to `<library_dir>/catalog.json`.
    pub catalog_path: Option<PathBuf>,

    /// Maximum concurrent ingest jobs.
    /// Override: `NUKEBOX_WORKER_THREADS`
    pub worker_threads: Option<usize>,

    /// Largest upload accepted, in bytes.
    pub max_upload_bytes: Option<u64>,

    /// Metadata resolver: `musicbrainz` or `none`.
    /// Override: `NUKEBOX_RESOLVER`
    pub resolver: ResolverKind,

    pub playback_poll_ms: Option<u64>,

    pub player_startup_grace_ms: Option<u64>,

    /// Player program followed by its arguments; the track path is appended.
    pub player_command: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = nukebox_core::Config::default();
        Self {
            control_port: core.control_port,
            discovery_port: core.discovery_port,
            art_port: core.art_port,
            advertise_ip: None,
            staging_dir: None,
            library_dir: None,
            art_dir: None,
            catalog_path: None,
            worker_threads: None,
            max_upload_bytes: None,
            resolver: core.resolver,
            playback_poll_ms: None,
            player_startup_grace_ms: None,
            player_command: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parse("NUKEBOX_CONTROL_PORT") {
            self.control_port = port;
        }
        if let Some(port) = env_parse("NUKEBOX_DISCOVERY_PORT") {
            self.discovery_port = port;
        }
        if let Some(port) = env_parse("NUKEBOX_ART_PORT") {
            self.art_port = port;
        }
        if let Some(ip) = env_parse("NUKEBOX_ADVERTISE_IP") {
            self.advertise_ip = Some(ip);
        }
        if let Some(threads) = env_parse("NUKEBOX_WORKER_THREADS") {
            self.worker_threads = Some(threads);
        }
        if let Ok(dir) = std::env::var("NUKEBOX_STAGING_DIR") {
            self.staging_dir = Some(PathBuf::from(dir));
        }
        if let Ok(val) = std::env::var("NUKEBOX_RESOLVER") {
            match parse_resolver(&val) {
                Some(kind) => self.resolver = kind,
                None => log::warn!("Ignoring unknown NUKEBOX_RESOLVER value: {}", val),
            }
        }

        // Note: NUKEBOX_LIBRARY_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to nukebox-core's Config type.
    pub fn to_core_config(&self) -> nukebox_core::Config {
        let defaults = nukebox_core::Config::default();
        nukebox_core::Config {
            control_port: self.control_port,
            discovery_port: self.discovery_port,
            art_port: self.art_port,
            advertise_ip: self.advertise_ip,
            staging_dir: self.staging_dir.clone().unwrap_or(defaults.staging_dir),
            library_dir: self.library_dir.clone().unwrap_or(defaults.library_dir),
            art_dir: self.art_dir.clone(),
            catalog_path: self.catalog_path.clone(),
            worker_threads: self.worker_threads.unwrap_or(defaults.worker_threads),
            max_upload_bytes: self.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            resolver: self.resolver,
            playback_poll_ms: self.playback_poll_ms.unwrap_or(defaults.playback_poll_ms),
            player_startup_grace_ms: self
                .player_startup_grace_ms
                .unwrap_or(defaults.player_startup_grace_ms),
            player_command: self
                .player_command
                .clone()
                .unwrap_or(defaults.player_command),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring unparseable {}={}", key, val);
            None
        }
    }
}

fn parse_resolver(value: &str) -> Option<ResolverKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "musicbrainz" => Some(ResolverKind::MusicBrainz),
        "none" | "off" => Some(ResolverKind::None),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_core_defaults() {
        let config = ServerConfig::from_yaml("{}").unwrap();
        let core = config.to_core_config();
        let defaults = nukebox_core::Config::default();
        assert_eq!(core.control_port, 18008);
        assert_eq!(core.discovery_port, 19009);
        assert_eq!(core.art_port, 8888);
        assert_eq!(core.library_dir, defaults.library_dir);
        assert_eq!(core.player_command, defaults.player_command);
        assert!(core.validate().is_ok());
    }

    #[test]
    fn yaml_values_reach_core_config() {
        let config = ServerConfig::from_yaml(
            r#"
control_port: 19000
advertise_ip: 192.168.1.50
library_dir: /srv/nukebox
worker_threads: 2
resolver: none
player_command: [mpv, --no-video]
"#,
        )
        .unwrap();
        let core = config.to_core_config();
        assert_eq!(core.control_port, 19000);
        assert_eq!(core.advertise_ip, Some("192.168.1.50".parse().unwrap()));
        assert_eq!(core.paths().art, PathBuf::from("/srv/nukebox/art"));
        assert_eq!(core.worker_threads, 2);
        assert_eq!(core.resolver, ResolverKind::None);
        assert_eq!(core.player_command, vec!["mpv", "--no-video"]);
    }

    #[test]
    fn unknown_resolver_is_a_parse_error() {
        assert!(ServerConfig::from_yaml("resolver: discogs").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nukebox.yaml");
        std::fs::write(&path, "art_port: 9999\n").unwrap();
        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.to_core_config().art_port, 9999);
    }

    #[test]
    fn resolver_names_are_case_insensitive() {
        assert_eq!(parse_resolver("MusicBrainz"), Some(ResolverKind::MusicBrainz));
        assert_eq!(parse_resolver(" none "), Some(ResolverKind::None));
        assert_eq!(parse_resolver("discogs"), None);
    }
}
