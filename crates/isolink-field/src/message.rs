use std::collections::BTreeMap;

use bytes::Bytes;

use crate::field::BinaryField;

/// An ISO-8583 style message: numbered fields plus an optional transport
/// header captured from (or destined for) the wire.
///
/// Field 0 holds the message type indicator when the packager defines one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: BTreeMap<u16, Bytes>,
    header: Option<Vec<u8>>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    pub fn with_field(mut self, number: u16, value: impl Into<Bytes>) -> Self {
        self.set(number, value);
        self
    }

    /// Set (or replace) a field value.
    pub fn set(&mut self, number: u16, value: impl Into<Bytes>) {
        self.fields.insert(number, value.into());
    }

    /// Store a decoded field.
    pub fn set_field(&mut self, field: BinaryField) {
        let number = field.number();
        self.fields.insert(number, field.into_value());
    }

    pub fn get(&self, number: u16) -> Option<&Bytes> {
        self.fields.get(&number)
    }

    /// Field `number` as a [`BinaryField`], if present.
    pub fn field(&self, number: u16) -> Option<BinaryField> {
        self.fields
            .get(&number)
            .map(|value| BinaryField::new(number, value.clone()))
    }

    pub fn has(&self, number: u16) -> bool {
        self.fields.contains_key(&number)
    }

    pub fn unset(&mut self, number: u16) -> Option<Bytes> {
        self.fields.remove(&number)
    }

    /// Present field numbers in ascending order.
    pub fn field_numbers(&self) -> impl Iterator<Item = u16> + '_ {
        self.fields.keys().copied()
    }

    /// Present fields in ascending order.
    pub fn fields(&self) -> impl Iterator<Item = (u16, &Bytes)> {
        self.fields.iter().map(|(number, value)| (*number, value))
    }

    /// Highest present field number.
    pub fn max_field(&self) -> Option<u16> {
        self.fields.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Per-message transport header.
    pub fn header(&self) -> Option<&[u8]> {
        self.header.as_deref()
    }

    /// Mutable view of the per-message header, swapped in place on send.
    pub fn header_mut(&mut self) -> Option<&mut [u8]> {
        self.header.as_deref_mut()
    }

    pub fn set_header(&mut self, header: Option<Vec<u8>>) {
        self.header = header;
    }
}
