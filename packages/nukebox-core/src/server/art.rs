//! Static HTTP service for cover art.
//!
//! Serves the art directory at the root, so a file `art/<album>.jpeg` is
//! reachable as `http://<ip>:<port>/<album>.jpeg`.

use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::context::NetworkContext;
use crate::error::ServerError;

/// Builds the router serving `art_dir`.
pub fn art_router(art_dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(art_dir))
        .layer(TraceLayer::new_for_http())
}

/// Binds the art listener on all interfaces.
pub async fn bind_art(port: u16) -> Result<TcpListener, ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            service: "art",
            port,
            source,
        })
}

/// Serves `router` until `cancel` fires.
///
/// Records the bound port in `network` first, so art URLs built afterwards
/// point at the listener actually in use.
pub async fn run_art_server(
    listener: TcpListener,
    router: Router,
    network: NetworkContext,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let addr = listener.local_addr().map_err(ServerError::Serve)?;
    network.set_art_port(addr.port());
    log::info!("[Art] Serving cover art on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(ServerError::Serve)?;

    log::info!("[Art] Stopped");
    Ok(())
}
