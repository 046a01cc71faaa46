/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A length does not fit the 2-byte prefix.
    #[error("frame length {len} out of range (max {max})")]
    LengthOutOfRange { len: usize, max: usize },

    /// The frame exceeds the configured maximum packet length.
    #[error("frame too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame is shorter than the configured transport header.
    #[error("frame length {len} shorter than {header_len}-byte header")]
    ShortFrame { len: usize, header_len: usize },

    /// A header string could not be converted to packed decimal.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A packed-decimal byte contains a nibble above 9.
    #[error("invalid packed-decimal byte 0x{0:02X}")]
    InvalidBcd(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
