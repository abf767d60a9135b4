//! Length-prefixed framing for TCP links.
//!
//! Every frame on the wire is `[magic][length][body]`: a 4-byte magic, a
//! 4-byte big-endian body length, then the bincode-encoded [`Frame`]. The
//! length covers only the body and is capped on both encode and decode.

use bincode::Options;
use bytes::{Buf, BufMut, BytesMut};
use meshcast_core::PeerId;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MeshError;

/// First bytes of every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"MCST";

/// Bytes of magic plus length prefix.
const HEADER_SIZE: usize = 8;

/// Transport frames exchanged on a TCP link.
///
/// Mesh messages ride opaquely inside `Payload`, so unrecognized message
/// tags survive transit byte-for-byte. `Hello` and `HelloAck` exist only
/// for link establishment; the dialer speaks first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Dialer's first frame, carrying its own peer id.
    Hello { peer: PeerId },
    /// Acceptor's reply, carrying its own peer id.
    HelloAck { peer: PeerId },
    /// Wire bytes of one mesh message.
    Payload(Vec<u8>),
}

/// Codec turning a byte stream into [`Frame`]s and back.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
    /// Body length parsed from the current header, kept while waiting for
    /// the rest of the frame.
    current_length: Option<usize>,
}

impl FrameCodec {
    /// Codec accepting bodies up to `max_frame_size` bytes.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            current_length: None,
        }
    }
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = MeshError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, MeshError> {
        let body_length = match self.current_length {
            Some(length) => length,
            None => {
                if src.len() < HEADER_SIZE {
                    return Ok(None);
                }
                if src[0..4] != FRAME_MAGIC {
                    return Err(MeshError::Frame {
                        detail: "bad frame magic".to_string(),
                    });
                }
                let length = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
                if length > self.max_frame_size {
                    return Err(MeshError::Frame {
                        detail: format!("frame too large: {length} bytes"),
                    });
                }
                src.advance(HEADER_SIZE);
                self.current_length = Some(length);
                length
            }
        };
        if src.len() < body_length {
            src.reserve(body_length - src.len());
            return Ok(None);
        }
        let body = src.split_to(body_length);
        self.current_length = None;
        let frame = bincode_options()
            .deserialize(&body[..])
            .map_err(|e| MeshError::Frame {
                detail: format!("bad frame body: {e}"),
            })?;
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = MeshError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), MeshError> {
        let body = bincode_options()
            .serialize(&frame)
            .map_err(|e| MeshError::Frame {
                detail: format!("unencodable frame: {e}"),
            })?;
        if body.len() > self.max_frame_size {
            return Err(MeshError::Frame {
                detail: format!("frame too large: {} bytes", body.len()),
            });
        }
        dst.reserve(HEADER_SIZE + body.len());
        dst.put_slice(&FRAME_MAGIC);
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MAX: usize = 64 * 1024;

    fn encode_frame(frame: Frame) -> BytesMut {
        let mut codec = FrameCodec::new(TEST_MAX);
        let mut buffer = BytesMut::new();
        codec.encode(frame, &mut buffer).expect("encode");
        buffer
    }

    #[test]
    fn test_frames_roundtrip() {
        let frames = vec![
            Frame::Hello {
                peer: PeerId::new("127.0.0.1:7533"),
            },
            Frame::HelloAck {
                peer: PeerId::new("127.0.0.1:7534"),
            },
            Frame::Payload(vec![0, 1, 2, 3]),
            Frame::Payload(vec![]),
        ];
        for frame in frames {
            let mut buffer = encode_frame(frame.clone());
            let mut codec = FrameCodec::new(TEST_MAX);
            let decoded = codec.decode(&mut buffer).expect("decode").expect("frame");
            assert_eq!(decoded, frame);
            assert!(buffer.is_empty(), "nothing should be left over");
        }
    }

    #[test]
    fn test_partial_header_waits_for_more() {
        let full = encode_frame(Frame::Payload(vec![9; 16]));
        let mut codec = FrameCodec::new(TEST_MAX);
        let mut buffer = BytesMut::from(&full[..5]);
        assert!(codec.decode(&mut buffer).expect("decode").is_none());
    }

    #[test]
    fn test_partial_body_waits_then_completes() {
        let full = encode_frame(Frame::Payload(vec![7; 32]));
        let mut codec = FrameCodec::new(TEST_MAX);
        let mut buffer = BytesMut::from(&full[..HEADER_SIZE + 10]);
        assert!(codec.decode(&mut buffer).expect("decode").is_none());

        buffer.extend_from_slice(&full[HEADER_SIZE + 10..]);
        let decoded = codec.decode(&mut buffer).expect("decode").expect("frame");
        assert_eq!(decoded, Frame::Payload(vec![7; 32]));
    }

    #[test]
    fn test_bad_magic_is_an_error() {
        let mut buffer = BytesMut::from(&b"XXXX\x00\x00\x00\x00"[..]);
        let mut codec = FrameCodec::new(TEST_MAX);
        assert!(codec.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_oversized_length_is_an_error() {
        let mut buffer = BytesMut::new();
        buffer.put_slice(&FRAME_MAGIC);
        buffer.put_u32(u32::MAX);
        let mut codec = FrameCodec::new(TEST_MAX);
        assert!(codec.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_oversized_body_refuses_to_encode() {
        let mut codec = FrameCodec::new(16);
        let mut buffer = BytesMut::new();
        let result = codec.encode(Frame::Payload(vec![0; 64]), &mut buffer);
        assert!(result.is_err());
    }

    #[test]
    fn test_back_to_back_frames_decode_in_order() {
        let mut buffer = encode_frame(Frame::Payload(vec![1]));
        buffer.extend_from_slice(&encode_frame(Frame::Payload(vec![2])));

        let mut codec = FrameCodec::new(TEST_MAX);
        let first = codec.decode(&mut buffer).expect("decode").expect("frame");
        let second = codec.decode(&mut buffer).expect("decode").expect("frame");
        assert_eq!(first, Frame::Payload(vec![1]));
        assert_eq!(second, Frame::Payload(vec![2]));
        assert!(buffer.is_empty());
    }
}
