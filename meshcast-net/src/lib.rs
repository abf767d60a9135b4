//! Mesh networking for meshcast.
//!
//! This crate runs a node of a bounded-degree broadcast mesh:
//!
//! - **Flooding**: content received on one link is re-sent on every other
//!   link, so payloads reach the whole mesh without any routing tables.
//! - **Bounded degree**: each node admits at most `max_peers` connections
//!   and refers overflow dialers onward with `redirect` messages.
//! - **Membership gossip**: `connection` and `close` notices keep every
//!   node's peer table roughly current, and a full `table` snapshot seeds
//!   each newly admitted peer.
//! - **Healing**: when a connection closes, the node reconnects to the
//!   first other peer it still knows about.
//!
//! # Architecture
//!
//! ```text
//! MeshNode::run() (one task, owns all state)
//! ├── command channel (broadcast, connect, status, shutdown)
//! ├── transport inbox (inbound, opened, message, closed, failed)
//! ├── link task 1 (memory pair pump or tcp socket loop)
//! ├── link task 2
//! └── ...
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let hub = MemoryHub::new();
//! let (transport, events) = hub.open();
//! let (mut node, handle, _mesh_events) =
//!     MeshNode::new(MeshConfig::default(), transport, events);
//! node.set_data_handler(Box::new(|message, link| {
//!     if let Message::Content { payload } = message {
//!         println!("from {}: {} bytes", link.peer(), payload.len());
//!     }
//! }));
//! tokio::spawn(node.run());
//!
//! handle.connect(PeerId::new("peer-1"))?;
//! handle.broadcast(b"hello mesh".to_vec())?;
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod node;
pub mod tcp;
pub mod transport;

// Re-export the main types
pub use config::{MeshConfig, TcpConfig, DEFAULT_MAX_PEERS};
pub use error::{MeshError, MeshResult, ProtocolError, TransportError};
pub use memory::{MemoryHub, MemoryTransport};
pub use node::{DataHandler, MeshEvent, MeshHandle, MeshNode, MeshStatus, NodeCommand};
pub use tcp::TcpTransport;
pub use transport::{Direction, Link, LinkCommand, LinkId, Transport, TransportEvent};
