//! The mesh node event loop.
//!
//! All node state lives in one task. The loop pulls commands and transport
//! events from its inboxes and handles each to completion before the next,
//! so admission, routing, and healing never race and no state needs a
//! lock. Capacity is a hard ceiling: a full node closes new arrivals and
//! refers the rejected dialer onward with a `redirect` instead.

use meshcast_core::{Message, PeerId, PeerTable};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::error::{MeshError, MeshResult, ProtocolError, TransportError};
use crate::transport::{EventReceiver, Link, LinkId, Transport, TransportEvent};

/// Callback observing every inbound message before it is routed.
///
/// The second argument is the link the message arrived on. The callback
/// cannot influence routing; it exists to hand `content` payloads to the
/// application.
pub type DataHandler = Box<dyn FnMut(&Message, &Link) + Send>;

/// Commands accepted by a running node.
#[derive(Debug)]
pub enum NodeCommand {
    /// Flood an application payload to every connection.
    Broadcast(Vec<u8>),
    /// Dial a peer.
    Connect(PeerId),
    /// Reply with a snapshot of the node's state.
    Status(oneshot::Sender<MeshStatus>),
    /// Close every link and stop the event loop.
    Shutdown,
}

/// Point-in-time view of a node's state.
#[derive(Debug, Clone)]
pub struct MeshStatus {
    /// Local identity, once the transport assigned one.
    pub peer: Option<PeerId>,
    /// The peer table, in table order.
    pub table: Vec<PeerId>,
    /// Remote peers of admitted inbound links, in admission order.
    pub inbound: Vec<PeerId>,
    /// Remote peers of admitted outbound links, in admission order.
    pub outbound: Vec<PeerId>,
}

impl MeshStatus {
    /// Number of admitted connections.
    pub fn connection_count(&self) -> usize {
        self.inbound.len() + self.outbound.len()
    }
}

/// Observability events emitted to the hosting application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// The node knows its identity and can accept connections.
    Ready {
        /// The identity peers use to reach this node.
        peer: PeerId,
    },
    /// The transport lost its rendezvous channel. Existing links keep
    /// working; new dials may fail until it returns.
    SignalingLost,
}

/// Cloneable control handle for a running [`MeshNode`].
#[derive(Debug, Clone)]
pub struct MeshHandle {
    commands: mpsc::UnboundedSender<NodeCommand>,
}

impl MeshHandle {
    /// Flood `payload` to the mesh as a content message.
    pub fn broadcast(&self, payload: impl Into<Vec<u8>>) -> MeshResult<()> {
        self.send(NodeCommand::Broadcast(payload.into()))
    }

    /// Dial `peer`.
    pub fn connect(&self, peer: PeerId) -> MeshResult<()> {
        self.send(NodeCommand::Connect(peer))
    }

    /// Fetch a snapshot of the node's state.
    pub async fn status(&self) -> MeshResult<MeshStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(NodeCommand::Status(reply_tx))?;
        reply_rx.await.map_err(|_| MeshError::NodeStopped)
    }

    /// Stop the node. Harmless to call more than once.
    pub fn shutdown(&self) {
        let _ = self.commands.send(NodeCommand::Shutdown);
    }

    fn send(&self, command: NodeCommand) -> MeshResult<()> {
        self.commands
            .send(command)
            .map_err(|_| MeshError::NodeStopped)
    }
}

/// A mesh participant.
///
/// Owns its connection sets and peer table exclusively; every mutation
/// happens while handling one event, so the state observed between events
/// is always consistent.
pub struct MeshNode<T: Transport> {
    config: MeshConfig,
    transport: T,
    events: EventReceiver,
    commands: mpsc::UnboundedReceiver<NodeCommand>,
    mesh_events: mpsc::UnboundedSender<MeshEvent>,
    handler: Option<DataHandler>,
    local: Option<PeerId>,
    table: PeerTable,
    inbound: Vec<Link>,
    outbound: Vec<Link>,
    /// Dials issued but not yet open. Not admitted and not counted
    /// against capacity.
    pending: Vec<Link>,
}

impl<T: Transport> MeshNode<T> {
    /// Create a node over `transport`, returning the node, its control
    /// handle, and the observability event stream.
    pub fn new(
        config: MeshConfig,
        transport: T,
        events: EventReceiver,
    ) -> (Self, MeshHandle, mpsc::UnboundedReceiver<MeshEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (mesh_event_tx, mesh_event_rx) = mpsc::unbounded_channel();
        let node = Self {
            config,
            transport,
            events,
            commands: command_rx,
            mesh_events: mesh_event_tx,
            handler: None,
            local: None,
            table: PeerTable::new(),
            inbound: Vec::new(),
            outbound: Vec::new(),
            pending: Vec::new(),
        };
        (node, MeshHandle { commands: command_tx }, mesh_event_rx)
    }

    /// Install the data handler. Call before [`MeshNode::run`].
    pub fn set_data_handler(&mut self, handler: DataHandler) {
        self.handler = Some(handler);
    }

    /// Run the event loop until shutdown or transport teardown.
    pub async fn run(mut self) {
        info!(max_peers = self.config.max_peers, "mesh node starting");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("transport event stream ended");
                        break;
                    }
                },
            }
        }
        self.close_all_links();
        info!("mesh node stopped");
    }

    /// Returns false when the node should stop.
    fn handle_command(&mut self, command: NodeCommand) -> bool {
        match command {
            NodeCommand::Broadcast(payload) => {
                debug!(bytes = payload.len(), "broadcasting content");
                self.broadcast_except(Message::content(payload), &[]);
            }
            NodeCommand::Connect(peer) => self.connect_to(peer),
            NodeCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            NodeCommand::Shutdown => return false,
        }
        true
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Ready { peer } => self.handle_ready(peer),
            TransportEvent::Inbound { link } => self.accept_inbound(link),
            TransportEvent::Opened { link } => self.handle_opened(link),
            TransportEvent::Message { link, message } => self.handle_message(link, message),
            TransportEvent::Closed { link } => self.handle_closed(link),
            TransportEvent::Failed { error } => match &error {
                TransportError::PeerUnavailable { peer } => {
                    warn!(peer = %peer, "peer unavailable; ignoring");
                }
                TransportError::Other { detail } => {
                    warn!(detail = %detail, "transport error");
                }
            },
            TransportEvent::SignalingLost => {
                warn!("rendezvous channel lost; existing links unaffected");
                let _ = self.mesh_events.send(MeshEvent::SignalingLost);
            }
        }
    }

    fn handle_ready(&mut self, peer: PeerId) {
        info!(peer = %peer, "local identity assigned");
        self.table.push(peer.clone());
        self.local = Some(peer.clone());
        let _ = self.mesh_events.send(MeshEvent::Ready { peer });
    }

    /// Admission decision for a new inbound link.
    ///
    /// A full node closes the link without admitting it and refers the
    /// rejected dialer onward with a redirect through exactly one
    /// neighbor. The rejected peer never enters the table.
    fn accept_inbound(&mut self, link: Link) {
        if !self.can_connect() {
            info!(peer = %link.peer(), "mesh full; redirecting connection attempt");
            let rejected = link.peer().clone();
            link.close();
            self.forward_redirect(Message::redirect(rejected));
            return;
        }
        let peer = link.peer().clone();
        let id = link.id();
        info!(peer = %peer, link = %id, "admitted inbound connection");
        self.inbound.push(link);
        self.table.push(peer.clone());
        self.broadcast_except(Message::connection(peer), &[id]);
    }

    /// Dial `peer`. The link stays pending until the transport reports it
    /// open; a failed dial leaves the table and connection sets untouched.
    fn connect_to(&mut self, peer: PeerId) {
        debug!(peer = %peer, "connecting");
        let link = self.transport.connect(&peer);
        self.pending.push(link);
    }

    fn handle_opened(&mut self, id: LinkId) {
        if let Some(position) = self.pending.iter().position(|l| l.id() == id) {
            let link = self.pending.remove(position);
            // Pending dials hold no capacity slot, so a dial that opens
            // after the mesh filled up is closed, not admitted.
            if !self.can_connect() {
                info!(peer = %link.peer(), "at capacity; closing freshly opened dial");
                link.close();
                return;
            }
            let peer = link.peer().clone();
            info!(peer = %peer, link = %id, "outbound connection open");
            self.outbound.push(link);
            self.table.push(peer.clone());
            self.broadcast_except(Message::connection(peer), &[id]);
            return;
        }
        if let Some(link) = self.inbound.iter().find(|l| l.id() == id) {
            // The admitted side sends its table exactly once, as the first
            // thing the new link carries.
            debug!(link = %id, "inbound link open; sending table snapshot");
            if !link.send(Message::table(self.table.clone())) {
                debug!(link = %id, "snapshot send failed; link already gone");
            }
            return;
        }
        // Rejected inbound links report open before our close lands.
        debug!(link = %id, "open event for unknown link");
    }

    fn handle_message(&mut self, id: LinkId, message: Message) {
        let origin = match self.find_admitted(id) {
            Some(origin) => origin,
            None => {
                debug!(link = %id, message = %message, "message on unknown link; dropping");
                return;
            }
        };
        debug!(link = %id, message = %message, "routing message");
        if let Some(handler) = self.handler.as_mut() {
            let link = match origin {
                LinkSlot::Inbound(index) => &self.inbound[index],
                LinkSlot::Outbound(index) => &self.outbound[index],
            };
            handler(&message, link);
        }
        self.route(message, id);
    }

    /// Protocol routing. Terminal tags (`table`, `redirect`) never flood;
    /// everything else is re-sent to every link except the one it arrived
    /// on.
    fn route(&mut self, message: Message, origin: LinkId) {
        match message {
            Message::Content { payload } => {
                self.broadcast_except(Message::Content { payload }, &[origin]);
            }
            Message::Connection(peer) => {
                debug!(peer = %peer, "peer joined the mesh");
                self.table.push(peer.clone());
                self.broadcast_except(Message::Connection(peer), &[origin]);
            }
            Message::Close(peer) => {
                debug!(peer = %peer, "peer left the mesh");
                self.table.remove_first(&peer);
                self.broadcast_except(Message::Close(peer), &[origin]);
            }
            Message::Table(snapshot) => {
                debug!(peers = snapshot.len(), "adopting table snapshot");
                self.table.replace(snapshot);
            }
            Message::Redirect(target) => {
                if self.can_connect() {
                    info!(peer = %target, "accepting redirected peer");
                    self.connect_to(target);
                } else {
                    debug!(peer = %target, "full; passing redirect on");
                    self.forward_redirect(Message::Redirect(target));
                }
            }
            Message::Unknown { tag, data } => {
                let error = ProtocolError::UnknownMessageType { tag };
                warn!(error = %error, "unrecognized message; flooding unchanged");
                self.broadcast_except(Message::Unknown { tag, data }, &[origin]);
            }
        }
    }

    fn handle_closed(&mut self, id: LinkId) {
        if let Some(position) = self.pending.iter().position(|l| l.id() == id) {
            let link = self.pending.remove(position);
            debug!(peer = %link.peer(), link = %id, "dial closed before opening");
            return;
        }
        let link = if let Some(position) = self.inbound.iter().position(|l| l.id() == id) {
            self.inbound.remove(position)
        } else if let Some(position) = self.outbound.iter().position(|l| l.id() == id) {
            self.outbound.remove(position)
        } else {
            debug!(link = %id, "close event for unknown link");
            return;
        };
        let peer = link.peer().clone();
        info!(peer = %peer, link = %id, direction = %link.direction(), "connection closed");
        self.table.remove_first(&peer);
        self.broadcast_except(Message::close(peer), &[id]);
        if let Some(candidate) = self.choose_heal_peer() {
            info!(peer = %candidate, "reconnecting to heal the mesh");
            self.connect_to(candidate);
        }
    }

    /// Whether another connection may be admitted.
    fn can_connect(&self) -> bool {
        self.inbound.len() + self.outbound.len() < self.config.max_peers
    }

    /// Reconnect candidate after a close: the first table entry that is
    /// not the local node.
    fn choose_heal_peer(&self) -> Option<PeerId> {
        let local = self.local.as_ref()?;
        self.table.first_other(local).cloned()
    }

    /// Hand a redirect to exactly one neighbor: the first inbound link if
    /// any, else the first outbound. Redirects are never flooded.
    fn forward_redirect(&self, message: Message) {
        match self.inbound.first().or_else(|| self.outbound.first()) {
            Some(link) => {
                debug!(link = %link.id(), message = %message, "forwarding redirect");
                if !link.send(message) {
                    debug!(link = %link.id(), "redirect send failed; link already gone");
                }
            }
            None => warn!(message = %message, "no connection available to forward redirect"),
        }
    }

    /// Send `message` on every admitted link whose id is not in `exclude`.
    fn broadcast_except(&self, message: Message, exclude: &[LinkId]) {
        for link in self.inbound.iter().chain(self.outbound.iter()) {
            if exclude.contains(&link.id()) {
                continue;
            }
            if !link.send(message.clone()) {
                debug!(link = %link.id(), "dropping message for a dead link");
            }
        }
    }

    fn find_admitted(&self, id: LinkId) -> Option<LinkSlot> {
        if let Some(index) = self.inbound.iter().position(|l| l.id() == id) {
            return Some(LinkSlot::Inbound(index));
        }
        self.outbound
            .iter()
            .position(|l| l.id() == id)
            .map(LinkSlot::Outbound)
    }

    fn status(&self) -> MeshStatus {
        MeshStatus {
            peer: self.local.clone(),
            table: self.table.peers().to_vec(),
            inbound: self.inbound.iter().map(|l| l.peer().clone()).collect(),
            outbound: self.outbound.iter().map(|l| l.peer().clone()).collect(),
        }
    }

    fn close_all_links(&mut self) {
        for link in self
            .pending
            .drain(..)
            .chain(self.inbound.drain(..))
            .chain(self.outbound.drain(..))
        {
            link.close();
        }
    }
}

/// Where an admitted link lives.
enum LinkSlot {
    Inbound(usize),
    Outbound(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Direction;

    struct NullTransport;

    impl Transport for NullTransport {
        fn connect(&mut self, peer: &PeerId) -> Link {
            let (tx, _rx) = mpsc::unbounded_channel();
            Link::new(LinkId(0), peer.clone(), Direction::Outbound, tx)
        }
    }

    #[tokio::test]
    async fn test_handle_fails_after_node_drop() {
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (node, handle, _mesh_events) =
            MeshNode::new(MeshConfig::default(), NullTransport, event_rx);
        drop(node);

        assert!(matches!(
            handle.broadcast(b"late".to_vec()),
            Err(MeshError::NodeStopped)
        ));
        assert!(matches!(
            handle.status().await,
            Err(MeshError::NodeStopped)
        ));
    }

    #[test]
    fn test_status_counts_both_directions() {
        let status = MeshStatus {
            peer: Some(PeerId::new("me")),
            table: vec![PeerId::new("me")],
            inbound: vec![PeerId::new("a")],
            outbound: vec![PeerId::new("b"), PeerId::new("c")],
        };
        assert_eq!(status.connection_count(), 3);
    }
}
