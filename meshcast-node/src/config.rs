//! Node configuration assembled from the command line.

use std::net::SocketAddr;

use meshcast_core::PeerId;
use meshcast_net::{MeshConfig, TcpConfig};

use crate::cli::Cli;

/// Complete configuration for a running node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// TCP listen address, which is also the node's mesh identity.
    pub listen: SocketAddr,
    /// Peer to dial on startup.
    pub join: Option<PeerId>,
    /// Connection capacity.
    pub max_peers: usize,
    /// Log level when RUST_LOG is unset.
    pub log_level: String,
}

impl NodeConfig {
    /// Build from parsed CLI arguments.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            listen: cli.listen,
            join: cli.join.as_deref().map(PeerId::from),
            max_peers: cli.max_peers,
            log_level: cli.log_level.clone(),
        }
    }

    /// Mesh-layer configuration.
    pub fn mesh_config(&self) -> MeshConfig {
        MeshConfig::default().with_max_peers(self.max_peers)
    }

    /// Transport configuration.
    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig::new(self.listen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli_maps_every_field() {
        let cli = Cli::parse_from([
            "meshcast-node",
            "--listen",
            "127.0.0.1:9100",
            "--join",
            "127.0.0.1:9101",
            "--max-peers",
            "3",
        ]);
        let config = NodeConfig::from_cli(&cli);
        assert_eq!(config.listen.port(), 9100);
        assert_eq!(config.join, Some(PeerId::new("127.0.0.1:9101")));
        assert_eq!(config.max_peers, 3);
    }

    #[test]
    fn test_sub_configs_inherit_settings() {
        let cli = Cli::parse_from(["meshcast-node", "--max-peers", "2"]);
        let config = NodeConfig::from_cli(&cli);
        assert_eq!(config.mesh_config().max_peers, 2);
        assert_eq!(config.tcp_config().bind_addr, config.listen);
    }
}
