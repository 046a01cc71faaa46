use isolink_field::Message;

/// Rejection raised by a [`MessageFilter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("message vetoed: {reason}")]
pub struct FilterVeto {
    reason: String,
}

impl FilterVeto {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Inspects (and may rewrite) messages crossing a channel.
///
/// Returning `Err` drops the message; the connection stays up.
pub trait MessageFilter: Send + Sync {
    fn filter(&self, msg: &mut Message) -> Result<(), FilterVeto>;
}

impl<F> MessageFilter for F
where
    F: Fn(&mut Message) -> Result<(), FilterVeto> + Send + Sync,
{
    fn filter(&self, msg: &mut Message) -> Result<(), FilterVeto> {
        self(msg)
    }
}
