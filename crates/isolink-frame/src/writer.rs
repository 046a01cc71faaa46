use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use isolink_transport::IsoStream;

use crate::codec::{encode_frame, Frame, FrameConfig, KEEP_ALIVE};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.header.as_ref(), frame.body.as_ref())
    }

    /// Encode and send a header + body as one frame.
    pub fn send(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        let len = header.len() + body.len();
        if len > self.config.max_packet_length {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_packet_length,
            });
        }

        self.buf.clear();
        encode_frame(header, body, &mut self.buf)?;
        self.write_buffered()
    }

    /// Send a zero-length keep-alive frame.
    pub fn send_keep_alive(&mut self) -> Result<()> {
        tracing::trace!("sending keep-alive frame");
        self.buf.clear();
        self.buf.extend_from_slice(&KEEP_ALIVE);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl FrameWriter<IsoStream> {
    /// Create a frame writer for `IsoStream` and apply write timeout from config.
    pub fn with_config_stream(inner: IsoStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
