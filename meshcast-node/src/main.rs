//! Meshcast node daemon.
//!
//! Runs one TCP mesh node: lines read from stdin are flooded to the mesh
//! as content, and content received from the mesh is printed to stdout
//! prefixed with the sender's peer id.

mod cli;
mod config;
mod shutdown;

use std::time::Duration;

use meshcast_core::Message;
use meshcast_net::{MeshEvent, MeshNode, TcpTransport};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("Meshcast Node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_cli(&cli);

    let (transport, events) = TcpTransport::bind(config.tcp_config()).await?;
    let (mut node, handle, mut mesh_events) =
        MeshNode::new(config.mesh_config(), transport, events);

    // Content payloads surface through the data handler; everything else
    // is protocol traffic the node routes on its own.
    let (content_tx, mut content_rx) = mpsc::unbounded_channel();
    node.set_data_handler(Box::new(move |message, link| {
        if let Message::Content { payload } = message {
            let _ = content_tx.send((link.peer().clone(), payload.clone()));
        }
    }));

    let node_task = tokio::spawn(node.run());

    if let Some(peer) = config.join.clone() {
        info!(peer = %peer, "joining mesh");
        handle.connect(peer)?;
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status_interval = tokio::time::interval(Duration::from_secs(30));
    let shutdown_signal = shutdown::wait_for_shutdown_signal();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => break,
            event = mesh_events.recv() => match event {
                Some(MeshEvent::Ready { peer }) => {
                    info!(peer = %peer, "mesh identity ready; peers join with --join");
                }
                Some(MeshEvent::SignalingLost) => {
                    warn!("listener lost; new inbound connections will not arrive");
                }
                None => break,
            },
            received = content_rx.recv() => {
                if let Some((peer, payload)) = received {
                    println!("[{peer}] {}", String::from_utf8_lossy(&payload));
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        handle.broadcast(line.into_bytes())?;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
            _ = status_interval.tick() => {
                if let Ok(status) = handle.status().await {
                    info!(
                        connections = status.connection_count(),
                        known_peers = status.table.len(),
                        "mesh status"
                    );
                }
            }
        }
    }

    info!("shutting down");
    handle.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), node_task).await;
    Ok(())
}
