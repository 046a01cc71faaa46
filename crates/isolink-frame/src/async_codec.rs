//! `tokio_util::codec` adapter over the same wire format as
//! [`FrameReader`](crate::FrameReader) / [`FrameWriter`](crate::FrameWriter).

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, FrameConfig, KEEP_ALIVE};
use crate::error::{FrameError, Result};

/// Length + header framing for async streams.
#[derive(Debug, Clone, Default)]
pub struct NacCodec {
    config: FrameConfig,
}

impl NacCodec {
    /// Create a codec that splits `header_len` bytes off every frame.
    pub fn new(header_len: usize) -> Self {
        Self::with_config(FrameConfig {
            header_len,
            ..FrameConfig::default()
        })
    }

    /// Create a codec from an explicit frame configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Encode a keep-alive frame.
    pub fn encode_keep_alive(&self, dst: &mut BytesMut) {
        dst.extend_from_slice(&KEEP_ALIVE);
    }
}

impl Decoder for NacCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.config.header_len, self.config.max_packet_length)
    }
}

impl Encoder<Frame> for NacCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let len = item.header.len() + item.body.len();
        if len > self.config.max_packet_length {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_packet_length,
            });
        }
        encode_frame(&item.header, &item.body, dst)
    }
}
