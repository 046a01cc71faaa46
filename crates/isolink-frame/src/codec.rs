use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest length the 2-byte prefix can carry.
pub const MAX_FRAME_LENGTH: usize = u16::MAX as usize;

/// A zero-length frame, sent on idle links to keep them open.
pub const KEEP_ALIVE: [u8; LENGTH_PREFIX_SIZE] = [0x00, 0x00];

/// One framed message: transport header plus packed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Transport header bytes (empty when the link has none).
    pub header: Bytes,
    /// Packed message body.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
        }
    }

    /// The total wire size of this frame (prefix + header + body).
    pub fn wire_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.header.len() + self.body.len()
    }
}

/// Append the 2-byte big-endian length prefix.
///
/// Fails fast with `LengthOutOfRange` above 65535.
pub fn write_length(len: usize, dst: &mut BytesMut) -> Result<()> {
    if len > MAX_FRAME_LENGTH {
        return Err(FrameError::LengthOutOfRange {
            len,
            max: MAX_FRAME_LENGTH,
        });
    }
    dst.put_u16(len as u16);
    Ok(())
}

/// Read exactly two bytes from `src` and decode them as an unsigned
/// big-endian length.
pub fn read_length<R: Read>(src: &mut R) -> Result<usize> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match src.read_exact(&mut prefix) {
        Ok(()) => Ok(u16::from_be_bytes(prefix) as usize),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(FrameError::ConnectionClosed),
        Err(err) => Err(FrameError::Io(err)),
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┬─────────────────┐
/// │ Length (2B)  │ Header           │ Body            │
/// │ BE, covers   │ (0..N bytes,     │ (packed fields) │
/// │ header+body  │  e.g. 5B TPDU)   │                 │
/// └──────────────┴──────────────────┴─────────────────┘
/// ```
pub fn encode_frame(header: &[u8], body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = header.len() + body.len();
    dst.reserve(LENGTH_PREFIX_SIZE + len);
    write_length(len, dst)?;
    dst.put_slice(header);
    dst.put_slice(body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// `header_len` bytes are split off the front of every frame as its header.
/// Keep-alive frames are consumed and skipped. Returns `Ok(None)` if the
/// buffer doesn't contain a complete frame yet; on success, consumes the
/// frame bytes from the buffer.
pub fn decode_frame(
    src: &mut BytesMut,
    header_len: usize,
    max_packet_length: usize,
) -> Result<Option<Frame>> {
    loop {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None); // Need more data
        }

        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if len == 0 {
            tracing::trace!("keep-alive frame skipped");
            src.advance(LENGTH_PREFIX_SIZE);
            continue;
        }

        if len > max_packet_length {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: max_packet_length,
            });
        }
        if len < header_len {
            return Err(FrameError::ShortFrame { len, header_len });
        }

        if src.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(None); // Need more data
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let header = src.split_to(header_len).freeze();
        let body = src.split_to(len - header_len).freeze();
        return Ok(Some(Frame { header, body }));
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Number of header bytes expected at the front of each incoming frame.
    pub header_len: usize,
    /// Maximum frame length (header + body). Default: 65535.
    pub max_packet_length: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            header_len: 0,
            max_packet_length: MAX_FRAME_LENGTH,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
