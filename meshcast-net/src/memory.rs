//! In-process transport over channels.
//!
//! [`MemoryHub`] plays the role of the rendezvous broker: nodes register
//! under an id and dial each other by id. Messages travel as values
//! through one pump task per link pair, so an entire mesh can run inside a
//! single process. The acceptance tests and any embedded multi-node setup
//! use this transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use meshcast_core::PeerId;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{MeshError, MeshResult, TransportError};
use crate::transport::{
    Direction, EventReceiver, EventSender, Link, LinkCommand, LinkId, Transport, TransportEvent,
};

/// Shared rendezvous registry for in-process meshes.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

#[derive(Default)]
struct HubInner {
    nodes: HashMap<PeerId, NodeEntry>,
    next_node: u64,
}

struct NodeEntry {
    events: EventSender,
    links: Arc<AtomicU64>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under a hub-minted id.
    pub fn open(&self) -> (MemoryTransport, EventReceiver) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let links = Arc::new(AtomicU64::new(0));
        let peer = {
            let mut inner = lock(&self.inner);
            inner.next_node += 1;
            let peer = PeerId::new(format!("peer-{}", inner.next_node));
            // Ready must be queued before the node becomes dialable.
            let _ = event_tx.send(TransportEvent::Ready { peer: peer.clone() });
            inner.nodes.insert(
                peer.clone(),
                NodeEntry {
                    events: event_tx.clone(),
                    links: links.clone(),
                },
            );
            peer
        };
        (
            MemoryTransport {
                local: peer,
                hub: self.inner.clone(),
                events: event_tx,
                links,
            },
            event_rx,
        )
    }

    /// Register a node under a caller-chosen id. Fails when the id is
    /// already taken.
    pub fn open_with_id(&self, id: impl Into<PeerId>) -> MeshResult<(MemoryTransport, EventReceiver)> {
        let peer = id.into();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let links = Arc::new(AtomicU64::new(0));
        {
            let mut inner = lock(&self.inner);
            if inner.nodes.contains_key(&peer) {
                return Err(MeshError::Transport(TransportError::Other {
                    detail: format!("id already registered: {peer}"),
                }));
            }
            // Ready must be queued before the node becomes dialable.
            let _ = event_tx.send(TransportEvent::Ready { peer: peer.clone() });
            inner.nodes.insert(
                peer.clone(),
                NodeEntry {
                    events: event_tx.clone(),
                    links: links.clone(),
                },
            );
        }
        Ok((
            MemoryTransport {
                local: peer,
                hub: self.inner.clone(),
                events: event_tx,
                links,
            },
            event_rx,
        ))
    }

    /// Remove a node from the registry and tell it the rendezvous channel
    /// is gone. Its established links keep working; it just cannot be
    /// dialed any more.
    pub fn disconnect(&self, peer: &PeerId) {
        let entry = lock(&self.inner).nodes.remove(peer);
        if let Some(entry) = entry {
            debug!(peer = %peer, "deregistered from hub");
            let _ = entry.events.send(TransportEvent::SignalingLost);
        }
    }

    /// Drop the whole registry, notifying every registered node.
    pub fn shutdown(&self) {
        let entries: Vec<NodeEntry> = lock(&self.inner).nodes.drain().map(|(_, e)| e).collect();
        for entry in &entries {
            let _ = entry.events.send(TransportEvent::SignalingLost);
        }
    }

    /// Number of currently registered nodes.
    pub fn node_count(&self) -> usize {
        lock(&self.inner).nodes.len()
    }
}

// A panicked registrant must not wedge the whole hub.
fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Channel-backed transport handle for one registered node.
pub struct MemoryTransport {
    local: PeerId,
    hub: Arc<Mutex<HubInner>>,
    events: EventSender,
    links: Arc<AtomicU64>,
}

impl MemoryTransport {
    /// The id this node registered under.
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    fn next_link(counter: &AtomicU64) -> LinkId {
        LinkId(counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, peer: &PeerId) -> Link {
        let id = Self::next_link(&self.links);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let link = Link::new(id, peer.clone(), Direction::Outbound, command_tx);

        // The hub refuses self-dials the way a real broker would refuse a
        // peer dialing its own id.
        let remote = if peer == &self.local {
            None
        } else {
            lock(&self.hub)
                .nodes
                .get(peer)
                .map(|entry| (entry.events.clone(), entry.links.clone()))
        };
        let (remote_events, remote_links) = match remote {
            Some(found) => found,
            None => {
                debug!(peer = %peer, "dial refused; peer not registered");
                let _ = self.events.send(TransportEvent::Failed {
                    error: TransportError::PeerUnavailable { peer: peer.clone() },
                });
                let _ = self.events.send(TransportEvent::Closed { link: id });
                return link;
            }
        };

        let remote_id = Self::next_link(&remote_links);
        let (remote_command_tx, remote_command_rx) = mpsc::unbounded_channel();
        let remote_link = Link::new(
            remote_id,
            self.local.clone(),
            Direction::Inbound,
            remote_command_tx,
        );

        // Arrival before open, so the acceptor decides admission before it
        // treats the link as live.
        let _ = remote_events.send(TransportEvent::Inbound { link: remote_link });
        let _ = remote_events.send(TransportEvent::Opened { link: remote_id });
        let _ = self.events.send(TransportEvent::Opened { link: id });

        tokio::spawn(run_pair(
            PairEnd {
                commands: command_rx,
                events: self.events.clone(),
                link: id,
            },
            PairEnd {
                commands: remote_command_rx,
                events: remote_events,
                link: remote_id,
            },
        ));
        link
    }
}

/// One side of a link pair: its command stream, and where its own node
/// hears about the link.
struct PairEnd {
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: EventSender,
    link: LinkId,
}

/// Shuttle messages between the two ends of a link until either side
/// closes or drops its handle, then deliver exactly one `Closed` to each.
async fn run_pair(mut dialer: PairEnd, mut acceptor: PairEnd) {
    loop {
        tokio::select! {
            command = dialer.commands.recv() => match command {
                Some(LinkCommand::Send(message)) => {
                    let _ = acceptor.events.send(TransportEvent::Message {
                        link: acceptor.link,
                        message,
                    });
                }
                Some(LinkCommand::Close) | None => break,
            },
            command = acceptor.commands.recv() => match command {
                Some(LinkCommand::Send(message)) => {
                    let _ = dialer.events.send(TransportEvent::Message {
                        link: dialer.link,
                        message,
                    });
                }
                Some(LinkCommand::Close) | None => break,
            },
        }
    }
    let _ = dialer.events.send(TransportEvent::Closed { link: dialer.link });
    let _ = acceptor.events.send(TransportEvent::Closed { link: acceptor.link });
}
