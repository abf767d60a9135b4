//! Error types for the mesh layer.
//!
//! Nothing here is fatal to a running node. Transport failures surface as
//! events and are logged; protocol anomalies are logged and routing
//! continues. The only hard error an application sees is
//! [`MeshError::NodeStopped`], returned by handle calls after the node's
//! event loop has exited.

use meshcast_core::{PeerId, WireError};
use thiserror::Error;

/// Transport-level failure, reported as an event and never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The dialed peer cannot be reached through this transport.
    #[error("peer unavailable: {peer}")]
    PeerUnavailable {
        /// The peer that could not be reached.
        peer: PeerId,
    },
    /// Any other transport failure.
    #[error("transport failure: {detail}")]
    Other {
        /// Human-readable description.
        detail: String,
    },
}

/// Protocol anomaly observed while routing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A message carried a tag this version does not recognize. The
    /// message is still flooded unchanged.
    #[error("unknown message tag {tag}")]
    UnknownMessageType {
        /// The unrecognized tag byte.
        tag: u8,
    },
}

/// Top-level error for mesh operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// A transport operation failed.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// A message failed to encode or decode.
    #[error("wire: {0}")]
    Wire(#[from] WireError),

    /// A TCP frame could not be parsed or produced.
    #[error("framing: {detail}")]
    Frame {
        /// What the codec could not parse or produce.
        detail: String,
    },

    /// An underlying socket or listener operation failed.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The node's event loop has exited; its handles are dead.
    #[error("mesh node stopped")]
    NodeStopped,
}

/// Convenience result alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_peer() {
        let error = TransportError::PeerUnavailable {
            peer: PeerId::new("peer-9"),
        };
        assert_eq!(error.to_string(), "peer unavailable: peer-9");
    }

    #[test]
    fn test_unknown_tag_message() {
        let error = ProtocolError::UnknownMessageType { tag: 250 };
        assert_eq!(error.to_string(), "unknown message tag 250");
    }
}
