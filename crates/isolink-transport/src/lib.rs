//! TCP transport abstraction for ISO-8583 style links.
//!
//! This is the lowest layer of isolink. It owns socket setup (connect with
//! timeout, bind/accept) and hands out [`IsoStream`], the single I/O type
//! everything else builds on.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{IsoListener, TcpTransport};
pub use traits::IsoStream;
