//! Named, blocking, multi-producer multi-consumer mailboxes.
//!
//! A [`Space`] maps string keys to FIFO queues. Producers `out` (append) or
//! `push` (prepend) values; consumers block in `take` until a value arrives.
//! Entries may carry an expiry, after which they are invisible and are
//! discarded on the next access to their key.

mod space;

pub use space::Space;
