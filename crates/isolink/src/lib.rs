//! ISO-8583 channel transport.
//!
//! isolink moves ISO-8583 messages over TCP: binary field codecs, NAC
//! framing (2-byte length, optional TPDU header), channels, and adaptors that
//! pump messages between a channel and a pair of in-process queues.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP streams and listeners
//! - [`frame`]: length prefix, packed-decimal helpers and TPDU headers
//! - [`field`]: field codecs, messages and the packager
//! - [`space`]: keyed blocking queues with expiry
//! - [`channel`]: the NAC channel, its listener and message filters
//! - [`adaptor`]: Sender/Receiver pumps with reconnect and soft-stop

/// Re-export transport types.
pub mod transport {
    pub use isolink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use isolink_frame::*;
}

/// Re-export field codec and message types.
pub mod field {
    pub use isolink_field::*;
}

/// Re-export the queue space.
pub mod space {
    pub use isolink_space::*;
}

/// Re-export channel types.
pub mod channel {
    pub use isolink_channel::*;
}

/// Re-export adaptor types.
pub mod adaptor {
    pub use isolink_adaptor::*;
}
