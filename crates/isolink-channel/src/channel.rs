use isolink_field::Message;

use crate::error::Result;

/// The fixed capability set every channel offers.
///
/// Implementations must allow `receive` on one thread while `send` and
/// `disconnect` run on others. `disconnect` must unblock a pending `receive`.
pub trait IsoChannel: Send + Sync {
    /// Open the connection. A no-op when already connected.
    fn connect(&self) -> Result<()>;

    /// Close the connection. Idempotent.
    fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Pack and write one message.
    ///
    /// The message header may be rewritten in place (TPDU swap).
    fn send(&self, msg: &mut Message) -> Result<()>;

    /// Block until one message arrives.
    fn receive(&self) -> Result<Message>;

    /// Write a zero-length keep-alive frame.
    fn send_keep_alive(&self) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
