//! Connected ISO-8583 channels.
//!
//! A channel owns one socket and turns [`Message`](isolink_field::Message)s
//! into length-prefixed, header-carrying frames and back. The adaptor layer
//! only sees the [`IsoChannel`] trait and the [`Disposition`] of each error.

pub mod channel;
pub mod config;
pub mod error;
pub mod filter;
pub mod listener;
pub mod nac;

pub use channel::IsoChannel;
pub use config::ChannelConfig;
pub use error::{ChannelError, Disposition, FaultKind, Result};
pub use filter::{FilterVeto, MessageFilter};
pub use listener::ChannelListener;
pub use nac::NacChannel;
