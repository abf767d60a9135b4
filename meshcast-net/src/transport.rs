//! The transport contract.
//!
//! A transport owns connection establishment and I/O; the mesh node owns
//! all protocol state. The two meet over channels: the transport pushes
//! [`TransportEvent`]s into the node's inbox, and the node drives each
//! connection through its [`Link`] handle. Two implementations ship with
//! this crate: [`crate::memory::MemoryTransport`] for in-process meshes and
//! [`crate::tcp::TcpTransport`] for real networks.

use std::fmt;

use meshcast_core::{Message, PeerId};
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Identifier of one link, unique within a single node's transport and
/// never across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Which side initiated a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The remote peer dialed us.
    Inbound,
    /// We dialed the remote peer.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Commands a node sends down a link.
#[derive(Debug)]
pub enum LinkCommand {
    /// Deliver a message to the remote peer.
    Send(Message),
    /// Tear the link down.
    Close,
}

/// Handle to one connection.
///
/// The node is the only owner; a link never appears in more than one of
/// its connection sets. Sends go through an unbounded channel, so the node
/// loop never blocks on a slow peer.
#[derive(Debug)]
pub struct Link {
    id: LinkId,
    peer: PeerId,
    direction: Direction,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl Link {
    /// Build a link handle. Called by transports only.
    pub fn new(
        id: LinkId,
        peer: PeerId,
        direction: Direction,
        commands: mpsc::UnboundedSender<LinkCommand>,
    ) -> Self {
        Self {
            id,
            peer,
            direction,
            commands,
        }
    }

    /// This link's id.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// The remote peer.
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Which side initiated the link.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Queue a message for delivery. Returns false when the link's I/O
    /// task is already gone.
    pub fn send(&self, message: Message) -> bool {
        self.commands.send(LinkCommand::Send(message)).is_ok()
    }

    /// Ask the transport to close this link. The matching
    /// [`TransportEvent::Closed`] arrives through the inbox later.
    pub fn close(&self) {
        let _ = self.commands.send(LinkCommand::Close);
    }
}

/// Events a transport delivers into a node's inbox.
///
/// Per link, `Opened` precedes any `Message`, and `Closed` is final and
/// delivered at most once.
#[derive(Debug)]
pub enum TransportEvent {
    /// The local identity was assigned. Delivered exactly once, before any
    /// link event.
    Ready {
        /// The identity this node goes by in the mesh.
        peer: PeerId,
    },
    /// A remote peer opened a link to us. The node decides admission
    /// before the link carries anything.
    Inbound {
        /// Handle to the new link.
        link: Link,
    },
    /// A link finished opening.
    Opened {
        /// The link that opened.
        link: LinkId,
    },
    /// A message arrived on an open link.
    Message {
        /// The link it arrived on.
        link: LinkId,
        /// The decoded message.
        message: Message,
    },
    /// A link closed: remote close, local close, or I/O failure.
    Closed {
        /// The link that closed.
        link: LinkId,
    },
    /// A dial or other transport operation failed. Informational; the
    /// affected link, if any, also sees `Closed`.
    Failed {
        /// What went wrong.
        error: TransportError,
    },
    /// The transport lost its rendezvous channel. Existing links are
    /// unaffected; new dials may fail until it returns.
    SignalingLost,
}

/// Connection establishment, as the mesh node sees it.
pub trait Transport: Send + 'static {
    /// Begin connecting to `peer`. Returns the dialing link immediately;
    /// the outcome arrives later as [`TransportEvent::Opened`], or as
    /// [`TransportEvent::Failed`] followed by [`TransportEvent::Closed`].
    fn connect(&mut self, peer: &PeerId) -> Link;
}

/// Receiving half of a node's transport inbox.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending half of a node's transport inbox.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_send_reports_dead_io_task() {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Link::new(LinkId(1), PeerId::new("a"), Direction::Outbound, tx);
        assert!(link.send(Message::content(vec![1])));
        drop(rx);
        assert!(!link.send(Message::content(vec![2])));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(LinkId(3).to_string(), "link-3");
        assert_eq!(Direction::Inbound.to_string(), "inbound");
        assert_eq!(Direction::Outbound.to_string(), "outbound");
    }
}
