//! TCP transport integration tests.
//!
//! The protocol itself is exercised over the in-process transport in
//! `acceptance.rs`; these tests check the real-network plumbing: handshake
//! identities, table exchange over sockets, and failed dials.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use meshcast_core::{Message, PeerId};
use meshcast_net::{MeshConfig, MeshHandle, MeshNode, TcpConfig, TcpTransport};

use common::wait_for;

const CONVERGE_TIMEOUT_MS: u64 = 5000;
const POLL_MS: u64 = 20;

type Recorded = Arc<Mutex<Vec<(String, Message)>>>;

/// Spawn a TCP mesh node on an ephemeral port, recording observed
/// messages. Returns its minted peer id.
async fn spawn_tcp_node(max_peers: usize) -> (PeerId, MeshHandle, Recorded, JoinHandle<()>) {
    let config = TcpConfig::new("127.0.0.1:0".parse().unwrap())
        .with_connect_timeout(Duration::from_secs(2))
        .with_handshake_timeout(Duration::from_secs(2));
    let (transport, events) = TcpTransport::bind(config).await.expect("bind");
    let peer = transport.local_peer().clone();
    let (mut node, handle, _mesh_events) = MeshNode::new(
        MeshConfig::default().with_max_peers(max_peers),
        transport,
        events,
    );
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    node.set_data_handler(Box::new(move |message, link| {
        recorder
            .lock()
            .unwrap()
            .push((link.peer().to_string(), message.clone()));
    }));
    (peer, handle, seen, tokio::spawn(node.run()))
}

fn content_count(seen: &Recorded, payload: &[u8]) -> usize {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|(_, m)| matches!(m, Message::Content { payload: p } if p.as_slice() == payload))
        .count()
}

#[tokio::test]
async fn test_tcp_nodes_exchange_tables_and_content() {
    let (peer_a, a, seen_a, task_a) = spawn_tcp_node(5).await;
    let (peer_b, b, seen_b, task_b) = spawn_tcp_node(5).await;

    a.connect(peer_b.clone()).expect("connect");

    // The hello exchange carries real identities in both directions.
    let linked = wait_for(CONVERGE_TIMEOUT_MS, POLL_MS, || async {
        let status_a = a.status().await.expect("status a");
        let status_b = b.status().await.expect("status b");
        status_a.outbound == vec![peer_b.clone()] && status_b.inbound == vec![peer_a.clone()]
    })
    .await;
    assert!(linked, "nodes should identify each other over tcp");

    // The admission snapshot makes it across the socket.
    let expected = vec![peer_b.to_string(), peer_a.to_string()];
    let converged = wait_for(CONVERGE_TIMEOUT_MS, POLL_MS, || async {
        let table: Vec<String> = a
            .status()
            .await
            .expect("status")
            .table
            .iter()
            .map(|p| p.to_string())
            .collect();
        table == expected
    })
    .await;
    assert!(converged, "joiner should adopt the accepter table over tcp");

    // Content flows both ways.
    a.broadcast(b"over tcp".to_vec()).expect("broadcast");
    let delivered = wait_for(CONVERGE_TIMEOUT_MS, POLL_MS, || async {
        content_count(&seen_b, b"over tcp") == 1
    })
    .await;
    assert!(delivered);

    b.broadcast(b"right back".to_vec()).expect("broadcast");
    let returned = wait_for(CONVERGE_TIMEOUT_MS, POLL_MS, || async {
        content_count(&seen_a, b"right back") == 1
    })
    .await;
    assert!(returned);

    a.shutdown();
    b.shutdown();
    let _ = timeout(Duration::from_secs(2), task_a).await;
    let _ = timeout(Duration::from_secs(2), task_b).await;
}

#[tokio::test]
async fn test_tcp_failed_dial_leaves_state_clean() {
    let (peer_a, a, _seen_a, task_a) = spawn_tcp_node(5).await;

    // Nothing listens on the discard port, and the second id does not even
    // parse as an address.
    a.connect(PeerId::new("127.0.0.1:9")).expect("connect");
    a.connect(PeerId::new("not-an-address")).expect("connect");

    sleep(Duration::from_millis(500)).await;
    let status = a.status().await.expect("status");
    assert_eq!(status.connection_count(), 0, "failed dials admit nothing");
    assert_eq!(
        status.table,
        vec![peer_a.clone()],
        "failed dials leave the table untouched"
    );

    a.shutdown();
    let _ = timeout(Duration::from_secs(2), task_a).await;
}

#[tokio::test]
async fn test_tcp_self_dial_is_refused() {
    let (peer_a, a, _seen_a, task_a) = spawn_tcp_node(5).await;

    a.connect(peer_a.clone()).expect("connect");

    sleep(Duration::from_millis(300)).await;
    let status = a.status().await.expect("status");
    assert_eq!(status.connection_count(), 0);
    assert_eq!(status.table, vec![peer_a.clone()]);

    a.shutdown();
    let _ = timeout(Duration::from_secs(2), task_a).await;
}
