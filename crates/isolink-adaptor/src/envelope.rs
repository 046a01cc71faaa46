use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use isolink_field::Message;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one adaptor instance.
///
/// Tags sentinels so adaptors sharing an `in` queue can tell theirs apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdaptorId(u64);

impl AdaptorId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AdaptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything that travels through an adaptor's queue slots.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// An application message.
    Message(Message),
    /// Stop request for the Sender of the tagged adaptor.
    Stop(AdaptorId),
    /// Wakes the Sender of the tagged adaptor so it re-checks the connection.
    Wake(AdaptorId),
    /// Published on `<name>.ready` while the channel is usable.
    Ready(SystemTime),
    /// Published on `<name>.reconnect` while a forced reconnect is pending.
    Reconnect,
}

impl Envelope {
    /// The carried message, if this is one.
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<Message> for Envelope {
    fn from(msg: Message) -> Self {
        Self::Message(msg)
    }
}
