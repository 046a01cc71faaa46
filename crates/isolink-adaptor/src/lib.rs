//! Connection adaptor.
//!
//! A [`ChannelAdaptor`] owns one [`IsoChannel`](isolink_channel::IsoChannel)
//! and moves messages between it and a shared [`Space`](isolink_space::Space):
//! - the Sender pump takes messages from the `in` queue and writes them
//! - the Receiver pump reads messages and publishes them to the `out` queue
//!
//! The pumps coordinate only through queue slots (`<name>.ready`,
//! `<name>.reconnect`) and typed sentinels on `in`.

pub mod adaptor;
pub mod config;
pub mod counters;
pub mod envelope;
pub mod error;
mod pump;
pub mod registry;

#[cfg(test)]
mod testing;

pub use adaptor::{AdaptorState, ChannelAdaptor};
pub use config::{AdaptorConfig, PumpTimings};
pub use counters::{AdaptorStats, Counters};
pub use envelope::{AdaptorId, Envelope};
pub use error::{AdaptorError, Result};
pub use registry::AdaptorRegistry;
