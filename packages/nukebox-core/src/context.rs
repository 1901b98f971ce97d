//! Network context for building client-facing URLs.
//!
//! Cover art is served over HTTP, and the URL handed to clients has to carry
//! an address they can reach. [`NetworkContext`] holds that address and the
//! art service port, either configured explicitly or detected from the
//! machine's interfaces.

use std::net::IpAddr;
#[cfg(test)]
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;

/// Network configuration shared across services.
///
/// # Modes
///
/// - **Explicit**: the advertise IP comes from configuration.
///   Use [`NetworkContext::explicit`].
/// - **Auto-detect**: the local IP is looked up from the interfaces.
///   Use [`NetworkContext::auto_detect`].
#[derive(Clone)]
pub struct NetworkContext {
    /// Port of the cover-art HTTP service (updated once it is bound).
    art_port: Arc<RwLock<u16>>,
    /// IP address clients can reach us at.
    local_ip: Arc<RwLock<String>>,
    ip_detector: Option<Arc<dyn IpDetector>>,
}

impl NetworkContext {
    /// Creates a `NetworkContext` with an explicit advertise IP.
    #[must_use]
    pub fn explicit(art_port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            art_port: Arc::new(RwLock::new(art_port)),
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
            ip_detector: None,
        }
    }

    /// Creates a `NetworkContext` whose IP is detected now.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial IP detection fails.
    pub fn auto_detect(
        art_port: u16,
        ip_detector: Arc<dyn IpDetector>,
    ) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self {
            art_port: Arc::new(RwLock::new(art_port)),
            local_ip: Arc::new(RwLock::new(local_ip)),
            ip_detector: Some(ip_detector),
        })
    }

    /// Creates a `NetworkContext` for testing with a fixed IP.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(8888, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)))
    }

    /// Re-runs IP detection.
    ///
    /// Only available if created with [`NetworkContext::auto_detect`].
    pub fn detect_ip(&self) -> Result<String, NetworkError> {
        match &self.ip_detector {
            Some(detector) => detector.detect(),
            None => Err(NetworkError::NoDetector),
        }
    }

    #[must_use]
    pub fn art_port(&self) -> u16 {
        *self.art_port.read()
    }

    #[must_use]
    pub fn local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Records the port the art service actually bound to.
    pub fn set_art_port(&self, port: u16) {
        *self.art_port.write() = port;
    }

    pub fn set_local_ip(&self, ip: String) {
        *self.local_ip.write() = ip;
    }

    #[must_use]
    pub fn url_builder(&self) -> UrlBuilder {
        UrlBuilder::new(self.local_ip(), self.art_port())
    }

    /// Returns the URL clients use to fetch an art file.
    #[must_use]
    pub fn art_url(&self, file_name: &str) -> String {
        self.url_builder().art_url(file_name)
    }
}

/// Trait for detecting the local IP address.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Errors that can occur during network detection.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    #[error("No IP detector configured (using explicit mode)")]
    NoDetector,
}

/// Builds URLs pointing at the cover-art service.
pub struct UrlBuilder {
    ip: String,
    port: u16,
}

impl UrlBuilder {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Returns the base URL (e.g., `http://192.168.1.100:8888`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    /// Returns the URL of a file in the art directory.
    #[must_use]
    pub fn art_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url(), file_name)
    }
}
