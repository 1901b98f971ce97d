//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Tests and the binary both
//! go through it, so what runs in production is what gets tested.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, JsonCatalog};
use crate::context::{LocalIpDetector, NetworkContext};
use crate::error::{NukeboxError, NukeboxResult, ServerError};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::media::{
    CommandPlayer, LoftyTagReader, MusicBrainzResolver, NullResolver, Player, Resolver,
};
use crate::protocol_constants::EVENT_CHANNEL_CAPACITY;
use crate::queue::TrackQueue;
use crate::runtime::WorkerPool;
use crate::server::{
    art_router, bind_art, bind_control, bind_discovery, run_art_server, run_control_server,
    run_discovery, ConnectionManager, ControlState,
};
use crate::services::{IngestPipeline, PlaybackLoop};
use crate::state::{Config, LibraryPaths, PlaybackStatus, ResolverKind};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub config: Config,
    pub paths: LibraryPaths,
    /// Advertise IP and art port used in cover-art URLs.
    pub network: NetworkContext,
    pub queue: Arc<TrackQueue>,
    pub status: Arc<PlaybackStatus>,
    pub catalog: Arc<dyn Catalog>,
    pub player: Arc<dyn Player>,
    pub pipeline: Arc<IngestPipeline>,
    pub pool: WorkerPool,
    pub connections: Arc<ConnectionManager>,
    /// Domain events for anyone who wants to observe the server.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Cancelled on shutdown; every long-lived task watches it.
    pub cancel_token: CancellationToken,
}

/// Addresses and tasks of a started server.
pub struct RunningServer {
    pub control_addr: SocketAddr,
    pub discovery_addr: SocketAddr,
    pub art_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Waits for every listener and the playback loop to stop.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                log::warn!("[Bootstrap] Task ended abnormally: {}", e);
            }
        }
    }
}

impl BootstrappedServices {
    fn emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::clone(&self.event_bridge) as Arc<dyn EventEmitter>
    }

    /// State shared by control connection handlers.
    pub fn control_state(&self) -> ControlState {
        ControlState {
            queue: Arc::clone(&self.queue),
            catalog: Arc::clone(&self.catalog),
            pipeline: Arc::clone(&self.pipeline),
            pool: self.pool.clone(),
            connections: Arc::clone(&self.connections),
            emitter: self.emitter(),
            staging_dir: self.paths.staging.clone(),
            max_upload_bytes: self.config.max_upload_bytes,
        }
    }

    pub fn playback_loop(&self) -> PlaybackLoop {
        PlaybackLoop::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.status),
            Arc::clone(&self.player),
            self.emitter(),
            Duration::from_millis(self.config.playback_poll_ms),
            Duration::from_millis(self.config.player_startup_grace_ms),
        )
    }

    /// Binds all listeners and spawns them together with the playback loop.
    ///
    /// # Errors
    ///
    /// Returns an error if any listener cannot be bound. Nothing is spawned
    /// in that case.
    pub async fn start(&self) -> NukeboxResult<RunningServer> {
        let control = bind_control(self.config.control_port).await?;
        let discovery = bind_discovery(SocketAddr::from((
            [0, 0, 0, 0],
            self.config.discovery_port,
        )))?;
        let art = bind_art(self.config.art_port).await?;

        let local = |result: std::io::Result<SocketAddr>, service: &'static str, port: u16| {
            result.map_err(|source| {
                NukeboxError::from(ServerError::Bind {
                    service,
                    port,
                    source,
                })
            })
        };
        let control_addr = local(control.local_addr(), "control", self.config.control_port)?;
        let discovery_addr = local(
            discovery.local_addr(),
            "discovery",
            self.config.discovery_port,
        )?;
        let art_addr = local(art.local_addr(), "art", self.config.art_port)?;

        let cancel = &self.cancel_token;
        let mut tasks = Vec::with_capacity(4);

        tasks.push(tokio::spawn(run_control_server(
            control,
            self.control_state(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(run_discovery(discovery, cancel.clone())));

        let router = art_router(&self.paths.art);
        let network = self.network.clone();
        let art_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_art_server(art, router, network, art_cancel).await {
                log::error!("[Bootstrap] {}", e);
            }
        }));

        let playback = self.playback_loop();
        let playback_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            playback.run(playback_cancel).await;
        }));

        log::info!(
            "[Bootstrap] NukeBox up: control {}, discovery {}, art {} (advertising {})",
            control_addr,
            discovery_addr,
            art_addr,
            self.network.url_builder().base_url()
        );

        Ok(RunningServer {
            control_addr,
            discovery_addr,
            art_addr,
            tasks,
        })
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();
        self.player.shutdown().await;

        log::info!(
            "[Bootstrap] Shutdown complete ({} ingest job(s) still running)",
            self.pool.active_jobs()
        );
    }
}

fn create_resolver(kind: ResolverKind) -> NukeboxResult<Arc<dyn Resolver>> {
    Ok(match kind {
        ResolverKind::MusicBrainz => Arc::new(MusicBrainzResolver::new()?),
        ResolverKind::None => Arc::new(NullResolver),
    })
}

/// Bootstraps all services, detecting the advertise IP unless configured.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the directories cannot
/// be created, the catalog cannot be opened, or no IP can be detected.
pub fn bootstrap_services(config: &Config) -> NukeboxResult<BootstrappedServices> {
    let network = match config.advertise_ip {
        Some(ip) => NetworkContext::explicit(config.art_port, ip),
        None => NetworkContext::auto_detect(config.art_port, LocalIpDetector::arc())
            .map_err(|e| NukeboxError::Network(e.to_string()))?,
    };
    bootstrap_services_with_network(config, network)
}

/// Bootstraps all services with a caller-provided network context.
///
/// Wiring order:
///
/// 1. Validate config and create the staging, library and art directories
/// 2. Shared state (queue, playback status, event bridge, worker pool)
/// 3. Collaborators (catalog, tag reader, resolver, player)
/// 4. Ingest pipeline (depends on all of the above)
///
/// # Errors
///
/// See [`bootstrap_services`].
pub fn bootstrap_services_with_network(
    config: &Config,
    network: NetworkContext,
) -> NukeboxResult<BootstrappedServices> {
    config.validate().map_err(NukeboxError::Configuration)?;

    let paths = config.paths();
    paths.ensure_dirs().map_err(|e| {
        NukeboxError::Configuration(format!("Failed to create library directories: {}", e))
    })?;

    let queue = Arc::new(TrackQueue::new());
    let status = Arc::new(PlaybackStatus::new());
    let pool = WorkerPool::new(config.worker_threads);
    let connections = Arc::new(ConnectionManager::new());
    let cancel_token = CancellationToken::new();

    let event_bridge = Arc::new(BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let catalog: Arc<dyn Catalog> = Arc::new(JsonCatalog::open(config.catalog_path())?);
    let resolver = create_resolver(config.resolver)?;
    let player: Arc<dyn Player> = Arc::new(CommandPlayer::new(&config.player_command)?);

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::new(LoftyTagReader),
        resolver,
        Arc::clone(&catalog),
        Arc::clone(&queue),
        Arc::clone(&status),
        paths.clone(),
        network.clone(),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
    ));

    log::info!(
        "[Bootstrap] Library at {}, staging at {}, {} worker(s), resolver {:?}",
        paths.library.display(),
        paths.staging.display(),
        pool.limit(),
        config.resolver
    );

    Ok(BootstrappedServices {
        config: config.clone(),
        paths,
        network,
        queue,
        status,
        catalog,
        player,
        pipeline,
        pool,
        connections,
        event_bridge,
        cancel_token,
    })
}
