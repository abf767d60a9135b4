//! TCP transport.
//!
//! Peer ids on this transport are listen addresses: a node's id is the
//! `host:port` its listener bound, so any id received in a table or a
//! redirect can be dialed directly. Fresh links start with a two-frame
//! hello exchange (dialer speaks first, acceptor acks); after that a
//! single task per link drives the socket in both directions.

mod framing;

pub use framing::{Frame, FrameCodec, FRAME_MAGIC};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use meshcast_core::{wire, PeerId};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::config::TcpConfig;
use crate::error::MeshResult;
use crate::error::TransportError;
use crate::transport::{
    Direction, EventReceiver, EventSender, Link, LinkCommand, LinkId, Transport, TransportEvent,
};

/// TCP-backed transport.
pub struct TcpTransport {
    local: PeerId,
    config: TcpConfig,
    events: EventSender,
    links: Arc<AtomicU64>,
}

impl TcpTransport {
    /// Bind the listener, derive the local id from the bound address, and
    /// start accepting.
    pub async fn bind(config: TcpConfig) -> MeshResult<(TcpTransport, EventReceiver)> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let local = PeerId::new(local_addr.to_string());
        info!(addr = %local_addr, "tcp transport listening");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let links = Arc::new(AtomicU64::new(0));
        let _ = event_tx.send(TransportEvent::Ready { peer: local.clone() });
        tokio::spawn(accept_loop(
            listener,
            event_tx.clone(),
            links.clone(),
            local.clone(),
            config.clone(),
        ));

        let transport = TcpTransport {
            local,
            config,
            events: event_tx,
            links,
        };
        Ok((transport, event_rx))
    }

    /// The listen-address id this transport minted.
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, peer: &PeerId) -> Link {
        let id = LinkId(self.links.fetch_add(1, Ordering::Relaxed));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let link = Link::new(id, peer.clone(), Direction::Outbound, command_tx);
        tokio::spawn(dial(
            peer.clone(),
            self.local.clone(),
            id,
            command_rx,
            self.events.clone(),
            self.config.clone(),
        ));
        link
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: EventSender,
    links: Arc<AtomicU64>,
    local: PeerId,
    config: TcpConfig,
) {
    loop {
        if events.is_closed() {
            debug!("node gone; stopping accept loop");
            break;
        }
        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                debug!(addr = %remote_addr, "incoming tcp connection");
                let id = LinkId(links.fetch_add(1, Ordering::Relaxed));
                tokio::spawn(handle_inbound(
                    stream,
                    id,
                    events.clone(),
                    local.clone(),
                    config.clone(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_inbound(
    stream: TcpStream,
    id: LinkId,
    events: EventSender,
    local: PeerId,
    config: TcpConfig,
) {
    let mut framed = Framed::new(stream, FrameCodec::new(config.max_frame_size));

    // Dialer speaks first; anything else is not one of ours.
    let peer = match timeout(config.handshake_timeout, framed.next()).await {
        Ok(Some(Ok(Frame::Hello { peer }))) => peer,
        Ok(Some(Ok(frame))) => {
            debug!(frame = ?frame, "expected hello; dropping connection");
            return;
        }
        Ok(Some(Err(e))) => {
            debug!(error = %e, "handshake read failed");
            return;
        }
        Ok(None) => {
            debug!("connection closed during handshake");
            return;
        }
        Err(_) => {
            debug!("handshake timed out");
            return;
        }
    };

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let link = Link::new(id, peer.clone(), Direction::Inbound, command_tx);
    if events.send(TransportEvent::Inbound { link }).is_err() {
        return;
    }
    if let Err(e) = framed.send(Frame::HelloAck { peer: local }).await {
        debug!(error = %e, "hello ack failed");
        let _ = events.send(TransportEvent::Closed { link: id });
        return;
    }
    let _ = events.send(TransportEvent::Opened { link: id });
    debug!(peer = %peer, link = %id, "inbound tcp link open");
    run_link(framed, command_rx, events, id).await;
}

async fn dial(
    peer: PeerId,
    local: PeerId,
    id: LinkId,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: EventSender,
    config: TcpConfig,
) {
    match establish(&peer, &local, &config).await {
        Ok(framed) => {
            let _ = events.send(TransportEvent::Opened { link: id });
            debug!(peer = %peer, link = %id, "outbound tcp link open");
            run_link(framed, commands, events, id).await;
        }
        Err(error) => {
            debug!(peer = %peer, error = %error, "dial failed");
            let _ = events.send(TransportEvent::Failed { error });
            let _ = events.send(TransportEvent::Closed { link: id });
        }
    }
}

/// Connect, say hello, and wait for the ack.
async fn establish(
    peer: &PeerId,
    local: &PeerId,
    config: &TcpConfig,
) -> Result<Framed<TcpStream, FrameCodec>, TransportError> {
    if peer == local {
        return Err(TransportError::PeerUnavailable { peer: peer.clone() });
    }
    let addr: SocketAddr = peer
        .as_str()
        .parse()
        .map_err(|_| TransportError::PeerUnavailable { peer: peer.clone() })?;
    let stream = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(_)) | Err(_) => {
            return Err(TransportError::PeerUnavailable { peer: peer.clone() })
        }
    };
    let mut framed = Framed::new(stream, FrameCodec::new(config.max_frame_size));
    framed
        .send(Frame::Hello {
            peer: local.clone(),
        })
        .await
        .map_err(|e| TransportError::Other {
            detail: format!("hello failed: {e}"),
        })?;
    match timeout(config.handshake_timeout, framed.next()).await {
        Ok(Some(Ok(Frame::HelloAck { peer: acked }))) => {
            if &acked != peer {
                // A node bound to a wildcard address acks with the address
                // it bound, not the one we dialed.
                debug!(dialed = %peer, acked = %acked, "peer identifies differently; proceeding");
            }
            Ok(framed)
        }
        Ok(Some(Ok(frame))) => Err(TransportError::Other {
            detail: format!("expected hello ack, got {frame:?}"),
        }),
        Ok(Some(Err(e))) => Err(TransportError::Other {
            detail: format!("handshake read failed: {e}"),
        }),
        Ok(None) => Err(TransportError::Other {
            detail: "connection closed during handshake".to_string(),
        }),
        Err(_) => Err(TransportError::Other {
            detail: "handshake timed out".to_string(),
        }),
    }
}

/// Drive one open link: commands out to the socket, frames in to the
/// node, and exactly one `Closed` on the way out.
async fn run_link(
    mut framed: Framed<TcpStream, FrameCodec>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: EventSender,
    id: LinkId,
) {
    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(Frame::Payload(bytes))) => match wire::decode(&bytes) {
                    Ok(message) => {
                        if events
                            .send(TransportEvent::Message { link: id, message })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(link = %id, error = %e, "undecodable payload; dropping frame");
                    }
                },
                Some(Ok(frame)) => {
                    debug!(link = %id, frame = ?frame, "unexpected frame after handshake");
                }
                Some(Err(e)) => {
                    debug!(link = %id, error = %e, "link read failed");
                    break;
                }
                None => {
                    debug!(link = %id, "link closed by remote");
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(LinkCommand::Send(message)) => {
                    let bytes = match wire::encode(&message) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!(link = %id, error = %e, "unencodable message; dropping");
                            continue;
                        }
                    };
                    if let Err(e) = framed.send(Frame::Payload(bytes)).await {
                        debug!(link = %id, error = %e, "link write failed");
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => break,
            },
        }
    }
    let _ = events.send(TransportEvent::Closed { link: id });
}
