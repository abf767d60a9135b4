//! Wire encoding for mesh messages.
//!
//! A message is one tag byte followed by the variant payload. Peer ids and
//! tables are encoded with a deterministic bincode profile (fixed-width
//! integers, little-endian, trailing bytes rejected); `content` payloads
//! are raw bytes. Unrecognized tags decode to [`Message::Unknown`] with the
//! payload preserved, so re-encoding reproduces the original bytes exactly.

use std::fmt;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::message::Message;
use crate::peer::PeerId;
use crate::table::PeerTable;

/// Tag byte for `content` messages.
pub const TAG_CONTENT: u8 = 0;
/// Tag byte for `connection` messages.
pub const TAG_CONNECTION: u8 = 1;
/// Tag byte for `close` messages.
pub const TAG_CLOSE: u8 = 2;
/// Tag byte for `table` messages.
pub const TAG_TABLE: u8 = 3;
/// Tag byte for `redirect` messages.
pub const TAG_REDIRECT: u8 = 4;

/// Error raised by [`encode`] and [`decode`].
#[derive(Debug)]
pub enum WireError {
    /// The input held no tag byte.
    Empty,
    /// The payload for a known tag did not round through bincode.
    Payload {
        /// Name of the message the payload belonged to.
        tag: &'static str,
        /// Underlying bincode failure.
        detail: String,
    },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Empty => write!(f, "empty message"),
            WireError::Payload { tag, detail } => write!(f, "bad {tag} payload: {detail}"),
        }
    }
}

impl std::error::Error for WireError {}

/// The bincode profile shared by every encoder and decoder.
///
/// Fixed-width integers and a fixed byte order keep the encoding identical
/// across hosts; rejecting trailing bytes catches framing mistakes early.
fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Encode a message to wire bytes.
pub fn encode(message: &Message) -> Result<Vec<u8>, WireError> {
    let mut bytes = Vec::new();
    match message {
        Message::Content { payload } => {
            bytes.push(TAG_CONTENT);
            bytes.extend_from_slice(payload);
        }
        Message::Connection(peer) => {
            bytes.push(TAG_CONNECTION);
            bytes.extend(serialize_payload("connection", peer)?);
        }
        Message::Close(peer) => {
            bytes.push(TAG_CLOSE);
            bytes.extend(serialize_payload("close", peer)?);
        }
        Message::Table(table) => {
            bytes.push(TAG_TABLE);
            bytes.extend(serialize_payload("table", table)?);
        }
        Message::Redirect(peer) => {
            bytes.push(TAG_REDIRECT);
            bytes.extend(serialize_payload("redirect", peer)?);
        }
        Message::Unknown { tag, data } => {
            bytes.push(*tag);
            bytes.extend_from_slice(data);
        }
    }
    Ok(bytes)
}

/// Decode wire bytes into a message.
///
/// An unknown tag is not an error here: it decodes to [`Message::Unknown`]
/// so the caller can still flood it.
pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
    let (tag, body) = match bytes.split_first() {
        Some((tag, body)) => (*tag, body),
        None => return Err(WireError::Empty),
    };
    match tag {
        TAG_CONTENT => Ok(Message::Content {
            payload: body.to_vec(),
        }),
        TAG_CONNECTION => Ok(Message::Connection(deserialize_payload::<PeerId>(
            "connection",
            body,
        )?)),
        TAG_CLOSE => Ok(Message::Close(deserialize_payload::<PeerId>("close", body)?)),
        TAG_TABLE => Ok(Message::Table(deserialize_payload::<PeerTable>(
            "table", body,
        )?)),
        TAG_REDIRECT => Ok(Message::Redirect(deserialize_payload::<PeerId>(
            "redirect", body,
        )?)),
        tag => Ok(Message::Unknown {
            tag,
            data: body.to_vec(),
        }),
    }
}

fn serialize_payload<T: Serialize>(tag: &'static str, value: &T) -> Result<Vec<u8>, WireError> {
    bincode_options()
        .serialize(value)
        .map_err(|e| WireError::Payload {
            tag,
            detail: e.to_string(),
        })
}

fn deserialize_payload<T: DeserializeOwned>(
    tag: &'static str,
    body: &[u8],
) -> Result<T, WireError> {
    bincode_options()
        .deserialize(body)
        .map_err(|e| WireError::Payload {
            tag,
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_messages_roundtrip() {
        let messages = vec![
            Message::content(b"hello mesh".to_vec()),
            Message::connection(PeerId::new("peer-1")),
            Message::close(PeerId::new("peer-2")),
            Message::table(PeerTable::from(vec![
                PeerId::new("a"),
                PeerId::new("b"),
                PeerId::new("a"),
            ])),
            Message::redirect(PeerId::new("peer-3")),
        ];
        for message in messages {
            let bytes = encode(&message).expect("encode");
            let decoded = decode(&bytes).expect("decode");
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_content_payload_is_raw_bytes() {
        let bytes = encode(&Message::content(b"hi".to_vec())).expect("encode");
        assert_eq!(bytes, vec![TAG_CONTENT, b'h', b'i']);
    }

    #[test]
    fn test_unknown_tag_reencodes_byte_identically() {
        let original = vec![200u8, 5, 6, 7];
        let decoded = decode(&original).expect("decode");
        assert_eq!(
            decoded,
            Message::Unknown {
                tag: 200,
                data: vec![5, 6, 7]
            }
        );
        let reencoded = encode(&decoded).expect("encode");
        assert_eq!(reencoded, original);
    }

    #[test]
    fn test_unknown_tag_with_empty_body() {
        let decoded = decode(&[42]).expect("decode");
        assert_eq!(
            decoded,
            Message::Unknown {
                tag: 42,
                data: vec![]
            }
        );
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(decode(&[]), Err(WireError::Empty)));
    }

    #[test]
    fn test_garbage_payload_for_known_tag_is_an_error() {
        // A one-byte body can never hold a length-prefixed string.
        let result = decode(&[TAG_CONNECTION, 1]);
        assert!(matches!(result, Err(WireError::Payload { tag: "connection", .. })));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = encode(&Message::close(PeerId::new("x"))).expect("encode");
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }
}
