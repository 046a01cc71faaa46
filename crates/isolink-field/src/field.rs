use bytes::Bytes;

/// A single binary data element: field number plus raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryField {
    number: u16,
    value: Bytes,
}

impl BinaryField {
    /// Create a field holding `value`.
    pub fn new(number: u16, value: impl Into<Bytes>) -> Self {
        Self {
            number,
            value: value.into(),
        }
    }

    /// Create an empty field, ready to be filled by `unpack`.
    pub fn empty(number: u16) -> Self {
        Self::new(number, Bytes::new())
    }

    /// Field number.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Raw value.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Replace the raw value.
    pub fn set_value(&mut self, value: impl Into<Bytes>) {
        self.value = value.into();
    }

    /// Consume the field and return its value.
    pub fn into_value(self) -> Bytes {
        self.value
    }
}
