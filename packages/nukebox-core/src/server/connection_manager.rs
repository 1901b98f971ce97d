//! Tracking of live control connections.
//!
//! - `ConnectionManager`: every accepted client, with force-close on shutdown
//! - `ConnectionGuard`: RAII guard that unregisters a client on disconnect

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// What is known about a connected client.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: SocketAddr,
    /// Set once the client registers.
    pub name: Option<String>,
}

/// Registry of active control connections.
///
/// Each connection gets a child of one global cancellation token, so
/// [`close_all`](Self::close_all) reaches every handler at once.
pub struct ConnectionManager {
    connections: DashMap<u64, ConnectionInfo>,
    next_id: AtomicU64,
    /// Replaced after `close_all()` so later clients are not born cancelled.
    global_cancel: RwLock<CancellationToken>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a new connection and returns its guard.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections
            .insert(id, ConnectionInfo { peer, name: None });
        log::info!(
            "[Control] Connection {} from {} (total: {})",
            id,
            peer,
            self.connections.len()
        );

        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: u64) {
        if let Some((_, info)) = self.connections.remove(&id) {
            log::info!(
                "[Control] Connection {} ({}) closed (remaining: {})",
                id,
                info.name.as_deref().unwrap_or("unregistered"),
                self.connections.len()
            );
        }
    }

    /// Records the name a connection registered with.
    pub fn set_name(&self, id: u64, name: &str) {
        if let Some(mut info) = self.connections.get_mut(&id) {
            info.name = Some(name.to_string());
        }
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|info| info.clone())
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Signals every connection handler to stop.
    ///
    /// Returns the number of connections signalled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        log::info!("[Control] Closing {} connection(s)", count);
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        count
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters its connection when dropped, even if the handler panics.
pub struct ConnectionGuard {
    id: u64,
    manager: Arc<ConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancelled when the server force-closes connections.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}
