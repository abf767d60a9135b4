//! Protocol messages.

use std::fmt;

use crate::peer::PeerId;
use crate::table::PeerTable;

/// A routed mesh message.
///
/// Five tags make up the protocol. Anything else decodes to
/// [`Message::Unknown`] and is flooded unchanged, so newer peers can extend
/// the protocol without cutting older ones out of the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Application payload, flooded to the whole mesh.
    Content {
        /// Opaque application bytes.
        payload: Vec<u8>,
    },
    /// Membership notice: the carried peer joined the mesh.
    Connection(PeerId),
    /// Membership notice: the carried peer left the mesh.
    Close(PeerId),
    /// Snapshot replacing the receiver's entire peer table.
    Table(PeerTable),
    /// Overflow referral: the carried peer tried to join a full node.
    Redirect(PeerId),
    /// A tag this version does not recognize, payload preserved verbatim.
    Unknown {
        /// The unrecognized tag byte.
        tag: u8,
        /// The payload bytes, exactly as received.
        data: Vec<u8>,
    },
}

impl Message {
    /// Content message carrying `payload`.
    pub fn content(payload: impl Into<Vec<u8>>) -> Self {
        Message::Content {
            payload: payload.into(),
        }
    }

    /// Join notice for `peer`.
    pub fn connection(peer: PeerId) -> Self {
        Message::Connection(peer)
    }

    /// Leave notice for `peer`.
    pub fn close(peer: PeerId) -> Self {
        Message::Close(peer)
    }

    /// Table snapshot message.
    pub fn table(snapshot: PeerTable) -> Self {
        Message::Table(snapshot)
    }

    /// Overflow referral for `peer`.
    pub fn redirect(peer: PeerId) -> Self {
        Message::Redirect(peer)
    }

    /// Message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Content { .. } => "content",
            Message::Connection(_) => "connection",
            Message::Close(_) => "close",
            Message::Table(_) => "table",
            Message::Redirect(_) => "redirect",
            Message::Unknown { .. } => "unknown",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Content { payload } => write!(f, "content({} bytes)", payload.len()),
            Message::Connection(peer) => write!(f, "connection({peer})"),
            Message::Close(peer) => write!(f, "close({peer})"),
            Message::Table(table) => write!(f, "table({} peers)", table.len()),
            Message::Redirect(peer) => write!(f, "redirect({peer})"),
            Message::Unknown { tag, data } => {
                write!(f, "unknown(tag={tag}, {} bytes)", data.len())
            }
        }
    }
}
