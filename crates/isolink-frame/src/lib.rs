//! Length framing and transport-header handling for ISO-8583 style links.
//!
//! Every message on the wire is laid out as:
//! - A 2-byte big-endian length covering everything that follows
//! - An optional transport header (typically a 5-byte TPDU)
//! - The packed message body
//!
//! A zero length is a keep-alive and carries no message.

pub mod bcd;
pub mod codec;
pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::NacCodec;
pub use codec::{
    decode_frame, encode_frame, read_length, write_length, Frame, FrameConfig, KEEP_ALIVE,
    LENGTH_PREFIX_SIZE, MAX_FRAME_LENGTH,
};
pub use error::{FrameError, Result};
pub use header::{parse_header, swap_tpdu, write_header, TPDU_LENGTH};
pub use reader::FrameReader;
pub use writer::FrameWriter;
