/// Errors that can occur while packing or unpacking fields.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    /// A fixed-length field was given a value of the wrong size.
    #[error("field {field}: length mismatch (expected {expected} bytes, got {actual})")]
    LengthMismatch {
        field: u16,
        expected: usize,
        actual: usize,
    },

    /// A variable-length field exceeds its configured maximum.
    #[error("field {field}: {actual} bytes exceeds max {max}")]
    TooLong {
        field: u16,
        max: usize,
        actual: usize,
    },

    /// The codec capacity cannot be represented by its length prefix.
    #[error("codec capacity {max} exceeds encoding limit {limit}")]
    CapacityOutOfRange { max: usize, limit: usize },

    /// The input ended before the field was complete.
    #[error("field {field}: truncated (needed {needed} bytes, {available} available)")]
    Truncated {
        field: u16,
        needed: usize,
        available: usize,
    },

    /// A fixed-hex field contains a non-hex character.
    #[error("field {field}: invalid hex digits")]
    InvalidHex { field: u16 },

    /// A packed-decimal length prefix contains an invalid nibble.
    #[error("field {field}: invalid packed-decimal length byte 0x{byte:02X}")]
    InvalidBcd { field: u16, byte: u8 },

    /// The field number cannot be carried in the primary bitmap.
    #[error("field {0} not supported by the primary bitmap")]
    UnsupportedField(u16),

    /// No codec is configured for a present field.
    #[error("no codec configured for field {0}")]
    NoCodec(u16),

    /// A field the packager requires is absent from the message.
    #[error("required field {0} missing")]
    MissingField(u16),

    /// Bytes remained after the last field was unpacked.
    #[error("{0} trailing bytes after last field")]
    TrailingBytes(usize),

    /// The same field number was configured twice.
    #[error("field {0} configured more than once")]
    DuplicateField(u16),

    /// A packager layout could not be loaded.
    #[error("packager load failed: {0}")]
    LoadFailed(String),

    /// A packager layout was not valid JSON.
    #[error("invalid packager JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FieldError>;
