/// Errors that can occur while configuring or driving an adaptor.
#[derive(Debug, thiserror::Error)]
pub enum AdaptorError {
    /// The configuration is unusable; the adaptor never starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Another live adaptor already uses this name.
    #[error("adaptor {0:?} already registered")]
    DuplicateName(String),

    /// The requested lifecycle transition is not allowed.
    #[error("adaptor {name:?} cannot {action} while {state}")]
    InvalidState {
        name: String,
        action: &'static str,
        state: crate::adaptor::AdaptorState,
    },

    /// Channel construction failed.
    #[error("channel error: {0}")]
    Channel(#[from] isolink_channel::ChannelError),

    /// Packager construction failed.
    #[error("packager error: {0}")]
    Field(#[from] isolink_field::FieldError),

    /// Configuration JSON could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Worker thread could not be spawned or config could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AdaptorError>;
