//! Stream framing for the TCP transport.
//!
//! Frame format: `[length:4][body:N]`
//!
//! - **length**: body size in bytes (little-endian u32)
//! - **body**: bincode-encoded [`Envelope`]

use std::io::{self, Read};
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

use super::message::WireMessage;

/// Size of the length prefix.
pub const HEADER_SIZE: usize = 4;

/// A message plus the sender's advertised member address.
///
/// The receiver maps `from` to a process id through the membership view; the
/// TCP peer address is an ephemeral port and cannot be used for that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: SocketAddr,
    pub message: WireMessage,
}

/// Encode an envelope into a length-prefixed frame.
pub fn encode(envelope: &Envelope, max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
    let body = bincode::serialize(envelope)?;
    if body.len() > max_frame_size || body.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge {
            size: body.len(),
            max: max_frame_size,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one frame from the front of `buf`.
///
/// Returns the envelope and the number of bytes consumed.
pub fn decode(buf: &[u8], max_frame_size: usize) -> Result<(Envelope, usize), FrameError> {
    if buf.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            have: buf.len(),
        });
    }
    let length = body_length(&buf[..HEADER_SIZE], max_frame_size)?;
    let total = HEADER_SIZE + length;
    if buf.len() < total {
        return Err(FrameError::Truncated {
            needed: total,
            have: buf.len(),
        });
    }
    let envelope = bincode::deserialize(&buf[HEADER_SIZE..total])?;
    Ok((envelope, total))
}

/// Read one frame from a blocking stream.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub fn read_frame<R: Read>(reader: &mut R, max_frame_size: usize) -> io::Result<Option<Envelope>> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let length = body_length(&header, max_frame_size).map_err(invalid_data)?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;

    bincode::deserialize(&body)
        .map(Some)
        .map_err(|e| invalid_data(FrameError::Codec(e)))
}

fn body_length(header: &[u8], max_frame_size: usize) -> Result<usize, FrameError> {
    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(header);
    let length = u32::from_le_bytes(raw) as usize;
    if length > max_frame_size {
        return Err(FrameError::TooLarge {
            size: length,
            max: max_frame_size,
        });
    }
    Ok(length)
}

fn invalid_data(e: FrameError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::ProposalId;

    fn envelope(message: WireMessage) -> Envelope {
        Envelope {
            from: SocketAddr::from(([127, 0, 0, 1], 7000)),
            message,
        }
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let first = envelope(WireMessage::Commit(ProposalId::new(1, 2)));
        let second = envelope(WireMessage::P2p(b"hello".to_vec()));

        let mut buf = encode(&first, 1024).unwrap();
        buf.extend(encode(&second, 1024).unwrap());

        let (decoded, used) = decode(&buf, 1024).unwrap();
        assert_eq!(decoded, first);
        let (decoded, rest) = decode(&buf[used..], 1024).unwrap();
        assert_eq!(decoded, second);
        assert_eq!(used + rest, buf.len());
    }

    #[test]
    fn test_truncated_frame() {
        let buf = encode(&envelope(WireMessage::Heartbeat), 1024).unwrap();
        assert!(matches!(decode(&buf[..2], 1024), Err(FrameError::Truncated { .. })));
        assert!(matches!(
            decode(&buf[..buf.len() - 1], 1024),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let big = envelope(WireMessage::P2p(vec![7u8; 256]));
        assert!(matches!(encode(&big, 64), Err(FrameError::TooLarge { .. })));

        let buf = encode(&big, 1024).unwrap();
        assert!(matches!(decode(&buf, 64), Err(FrameError::TooLarge { .. })));
    }

    #[test]
    fn test_read_frame_from_stream() {
        let msg = envelope(WireMessage::Redirect(vec![b"x".to_vec()]));
        let buf = encode(&msg, 1024).unwrap();
        let mut cursor = io::Cursor::new(buf);

        assert_eq!(read_frame(&mut cursor, 1024).unwrap(), Some(msg));
        // Clean EOF.
        assert_eq!(read_frame(&mut cursor, 1024).unwrap(), None);
    }
}
