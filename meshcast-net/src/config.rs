//! Mesh and transport configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default connection capacity per node, inbound and outbound combined.
pub const DEFAULT_MAX_PEERS: usize = 5;

/// Default TCP listen port.
pub const DEFAULT_PORT: u16 = 7533;

/// Default timeout for an outbound TCP dial.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the hello exchange on a new TCP link.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on a single TCP frame body.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Mesh node configuration.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Maximum admitted connections. Dials that are still pending do not
    /// count; a node at this limit redirects new arrivals instead of
    /// admitting them.
    pub max_peers: usize,
}

impl MeshConfig {
    /// Set the connection capacity.
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

/// TCP transport configuration. The mesh layer never reads this; only the
/// transport does.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Address the listener binds. Doubles as the node's peer id, so it
    /// must be an address other peers can dial.
    pub bind_addr: SocketAddr,
    /// How long an outbound dial may take before it fails.
    pub connect_timeout: Duration,
    /// How long the hello exchange may take on a fresh link.
    pub handshake_timeout: Duration,
    /// Largest accepted frame body, in bytes.
    pub max_frame_size: usize,
}

impl TcpConfig {
    /// Configuration listening on `bind_addr` with default timeouts.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the frame size cap.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mesh_config() {
        let config = MeshConfig::default();
        assert_eq!(config.max_peers, DEFAULT_MAX_PEERS);
    }

    #[test]
    fn test_mesh_config_builder() {
        let config = MeshConfig::default().with_max_peers(2);
        assert_eq!(config.max_peers, 2);
    }

    #[test]
    fn test_default_tcp_config() {
        let config = TcpConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_tcp_config_builder() {
        let config = TcpConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_connect_timeout(Duration::from_secs(1))
            .with_handshake_timeout(Duration::from_secs(1))
            .with_max_frame_size(64);
        assert_eq!(config.bind_addr.port(), 0);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
        assert_eq!(config.max_frame_size, 64);
    }
}
