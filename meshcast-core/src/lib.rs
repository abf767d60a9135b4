//! Core types for the meshcast broadcast mesh.
//!
//! This crate defines the vocabulary shared by every meshcast component:
//! peer identities, the ordered peer table, the protocol message set, and
//! the deterministic wire encoding. It performs no I/O; transports and the
//! node event loop live in `meshcast-net`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod message;
pub mod peer;
pub mod table;
pub mod wire;

pub use message::Message;
pub use peer::PeerId;
pub use table::PeerTable;
pub use wire::WireError;
