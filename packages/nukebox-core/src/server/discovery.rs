//! UDP responder that lets clients find the server on the local network.
//!
//! Clients broadcast a fixed probe; the server answers the sender with a
//! fixed reply. The reply's source address is what clients connect to.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::protocol_constants::{DISCOVERY_PROBE, DISCOVERY_REPLY};

/// Largest datagram read; anything longer than the probe is ignored anyway.
const MAX_DATAGRAM: usize = 512;

/// Binds the discovery socket with address reuse and broadcast enabled.
pub fn bind_discovery(addr: SocketAddr) -> Result<UdpSocket, ServerError> {
    let port = addr.port();
    let bind_err = move |source: std::io::Error| ServerError::Bind {
        service: "discovery",
        port,
        source,
    };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;

    // SO_REUSEADDR - allows bind on rapid restarts
    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[Discovery] Failed to set SO_REUSEADDR: {}", e);
    }

    if let Err(e) = socket.set_broadcast(true) {
        log::warn!("[Discovery] Failed to set SO_BROADCAST: {}", e);
    }

    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(bind_err)
}

/// Answers probes until `cancel` fires.
pub async fn run_discovery(socket: UdpSocket, cancel: CancellationToken) {
    match socket.local_addr() {
        Ok(addr) => log::info!("[Discovery] Listening on {}", addr),
        Err(e) => log::warn!("[Discovery] Local address unknown: {}", e),
    }

    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    log::warn!("[Discovery] Receive failed: {}", e);
                    continue;
                }
            }
        };

        if &buf[..len] != DISCOVERY_PROBE {
            log::trace!("[Discovery] Ignoring {} byte datagram from {}", len, from);
            continue;
        }

        log::debug!("[Discovery] Probe from {}", from);
        if let Err(e) = socket.send_to(DISCOVERY_REPLY, from).await {
            log::warn!("[Discovery] Reply to {} failed: {}", from, e);
        }
    }

    log::info!("[Discovery] Stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn start() -> (SocketAddr, CancellationToken) {
        let socket = bind_discovery("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(run_discovery(socket, cancel.clone()));
        (addr, cancel)
    }

    async fn probe(server: SocketAddr, payload: &[u8]) -> Option<Vec<u8>> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(payload, server).await.unwrap();
        let mut buf = [0u8; MAX_DATAGRAM];
        match tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn replies_to_exact_probe() {
        let (addr, cancel) = start().await;
        assert_eq!(
            probe(addr, b"Hello Jukebox").await.as_deref(),
            Some(DISCOVERY_REPLY)
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn ignores_anything_else() {
        let (addr, cancel) = start().await;
        assert!(probe(addr, b"Hello Jukebox ").await.is_none());
        assert!(probe(addr, b"hello jukebox").await.is_none());
        assert!(probe(addr, b"").await.is_none());

        // Still answering after junk.
        assert!(probe(addr, DISCOVERY_PROBE).await.is_some());
        cancel.cancel();
    }
}
