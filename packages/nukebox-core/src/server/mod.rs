//! Network listeners: the control server, the discovery responder and the
//! cover-art HTTP service.

pub mod art;
mod connection;
pub mod connection_manager;
pub mod discovery;
pub mod session;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::error::ServerError;
use crate::events::EventEmitter;
use crate::queue::TrackQueue;
use crate::runtime::WorkerPool;
use crate::services::IngestPipeline;

pub use art::{art_router, bind_art, run_art_server};
pub use connection_manager::{ConnectionGuard, ConnectionInfo, ConnectionManager};
pub use discovery::{bind_discovery, run_discovery};
pub use session::{CompletedUpload, ConnectionSession, Mode, SessionEvent, SessionState};

/// Everything a connection handler needs. Cheap to clone per connection.
#[derive(Clone)]
pub struct ControlState {
    pub queue: Arc<TrackQueue>,
    pub catalog: Arc<dyn Catalog>,
    pub pipeline: Arc<IngestPipeline>,
    pub pool: WorkerPool,
    pub connections: Arc<ConnectionManager>,
    pub emitter: Arc<dyn EventEmitter>,
    pub staging_dir: PathBuf,
    pub max_upload_bytes: u64,
}

/// Binds the control listener on all interfaces.
pub async fn bind_control(port: u16) -> Result<TcpListener, ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            service: "control",
            port,
            source,
        })
}

/// Accepts control connections until `cancel` fires, then closes them all.
pub async fn run_control_server(
    listener: TcpListener,
    state: ControlState,
    cancel: CancellationToken,
) {
    match listener.local_addr() {
        Ok(addr) => log::info!("[Server] Control channel listening on {}", addr),
        Err(e) => log::warn!("[Server] Control channel address unknown: {}", e),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(connection::handle_connection(stream, peer, state.clone()));
                }
                Err(e) => {
                    log::warn!("[Server] Accept failed: {}", e);
                }
            }
        }
    }

    state.connections.close_all();
    log::info!("[Server] Control channel stopped");
}
