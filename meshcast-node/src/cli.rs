//! Command-line argument parsing.

use std::net::SocketAddr;

use clap::Parser;
use meshcast_net::DEFAULT_MAX_PEERS;

/// Broadcast mesh node: floods stdin lines to every reachable peer.
#[derive(Parser, Debug, Clone)]
#[command(name = "meshcast-node")]
#[command(about = "Broadcast mesh node: floods stdin lines to every reachable peer")]
#[command(version)]
pub struct Cli {
    /// Listen address. Doubles as this node's peer id, so it must be an
    /// address other peers can dial.
    #[arg(long, default_value = "127.0.0.1:7533")]
    pub listen: SocketAddr,

    /// Peer to join through, as host:port.
    #[arg(long)]
    pub join: Option<String>,

    /// Maximum connections, inbound and outbound combined.
    #[arg(long, default_value_t = DEFAULT_MAX_PEERS)]
    pub max_peers: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
