//! NukeBox Server - headless network jukebox.
//!
//! Clients on the LAN discover the server, upload tracks over the control
//! channel, and the server plays them in arrival order.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nukebox_core::{bootstrap_services, ResolverKind};
use tokio::signal;

use crate::config::ServerConfig;

/// How long to wait for listeners and the playback loop after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// NukeBox Server - upload, queue and play tracks from networked clients.
#[derive(Parser, Debug)]
#[command(name = "nukebox-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "NUKEBOX_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Control channel port (overrides config file).
    #[arg(short = 'p', long, env = "NUKEBOX_CONTROL_PORT")]
    port: Option<u16>,

    /// IP address advertised in cover-art URLs (overrides config file).
    #[arg(short = 'a', long, env = "NUKEBOX_ADVERTISE_IP")]
    advertise_ip: Option<std::net::IpAddr>,

    /// Library directory (overrides config file).
    #[arg(short = 'L', long, env = "NUKEBOX_LIBRARY_DIR")]
    library_dir: Option<PathBuf>,

    /// Skip MusicBrainz lookups; only embedded art is used.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("NukeBox Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.control_port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(library_dir) = args.library_dir {
        config.library_dir = Some(library_dir);
    }
    if args.offline {
        config.resolver = ResolverKind::None;
    }

    let core_config = config.to_core_config();
    log::info!(
        "Configuration: control_port={}, discovery_port={}, art_port={}, advertise_ip={}",
        core_config.control_port,
        core_config.discovery_port,
        core_config.art_port,
        core_config
            .advertise_ip
            .map_or_else(|| "auto".to_string(), |ip| ip.to_string())
    );

    let services = bootstrap_services(&core_config).context(
        "Failed to bootstrap services. If the local IP could not be detected, \
         specify --advertise-ip or set NUKEBOX_ADVERTISE_IP.",
    )?;

    let running = services
        .start()
        .await
        .context("Failed to start listeners")?;

    log::info!(
        "Listening: control {}, discovery {}, art {}",
        running.control_addr,
        running.discovery_addr,
        running.art_addr
    );

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;
    if tokio::time::timeout(SHUTDOWN_GRACE, running.join())
        .await
        .is_err()
    {
        log::warn!("Some tasks did not stop within {:?}", SHUTDOWN_GRACE);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
