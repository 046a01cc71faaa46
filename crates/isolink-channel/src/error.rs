use std::io::ErrorKind;

use isolink_field::FieldError;
use isolink_frame::FrameError;
use isolink_transport::TransportError;

use crate::filter::FilterVeto;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error (connect, socket options).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error (length prefix, header, socket I/O).
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The outgoing message could not be packed.
    #[error("pack failed: {0}")]
    Pack(#[source] FieldError),

    /// The incoming body could not be unpacked.
    #[error("unpack failed: {0}")]
    Unpack(#[source] FieldError),

    /// The packed message does not fit in one frame.
    #[error("message of {size} bytes exceeds max packet length {max}")]
    Oversize { size: usize, max: usize },

    /// A filter rejected the message.
    #[error(transparent)]
    Veto(#[from] FilterVeto),

    /// The channel has no open socket.
    #[error("channel not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// What kind of fault an error represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The message itself cannot be encoded.
    Codec,
    /// The peer sent something that cannot be decoded.
    Protocol,
    /// A socket read or write timed out.
    Timeout,
    /// The peer closed the connection.
    EndOfStream,
    /// Any other socket failure.
    Io,
}

/// How a caller should react to a [`ChannelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// A filter dropped the message. Nothing else to do.
    Veto,
    /// The connection is suspect; disconnect and reconnect.
    Recoverable(FaultKind),
    /// The message is bad; drop it and keep the connection.
    Fatal(FaultKind),
}

impl ChannelError {
    /// Classify this error.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Veto(_) => Disposition::Veto,
            Self::Pack(_) | Self::Oversize { .. } => Disposition::Fatal(FaultKind::Codec),
            // Only the send path produces this: the packed message cannot be
            // framed at all.
            Self::Frame(FrameError::LengthOutOfRange { .. }) => {
                Disposition::Fatal(FaultKind::Codec)
            }
            Self::Unpack(_) => Disposition::Recoverable(FaultKind::Protocol),
            Self::NotConnected => Disposition::Recoverable(FaultKind::Io),
            Self::Frame(err) => Disposition::Recoverable(frame_fault(err)),
            Self::Transport(err) => Disposition::Recoverable(transport_fault(err)),
        }
    }

    /// True when the error means the connection should be dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.disposition(), Disposition::Recoverable(_))
    }

    /// True for read or write timeouts.
    pub fn is_timeout(&self) -> bool {
        self.disposition() == Disposition::Recoverable(FaultKind::Timeout)
    }
}

fn frame_fault(err: &FrameError) -> FaultKind {
    match err {
        FrameError::ConnectionClosed => FaultKind::EndOfStream,
        FrameError::Io(io) => io_fault(io),
        _ => FaultKind::Protocol,
    }
}

fn transport_fault(err: &TransportError) -> FaultKind {
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => io_fault(io),
        TransportError::Connect { source, .. } | TransportError::Bind { source, .. } => {
            io_fault(source)
        }
        TransportError::Resolve { .. } => FaultKind::Io,
    }
}

fn io_fault(err: &std::io::Error) -> FaultKind {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => FaultKind::Timeout,
        ErrorKind::UnexpectedEof => FaultKind::EndOfStream,
        _ => FaultKind::Io,
    }
}
