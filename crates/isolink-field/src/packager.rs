use std::collections::BTreeMap;
use std::path::Path;

use bytes::BytesMut;
use tracing::trace;

use crate::codec::FieldCodec;
use crate::config::PackagerConfig;
use crate::error::{FieldError, Result};
use crate::field::BinaryField;
use crate::message::Message;

/// Size of the primary bitmap in bytes.
pub const BITMAP_LENGTH: usize = 8;

/// Highest field number the primary bitmap can carry.
pub const MAX_FIELD: u16 = 64;

/// Field number of the bitmap itself; never set on a message.
const BITMAP_FIELD: u16 = 1;

/// Packs and unpacks message bodies.
///
/// Body layout: field 0 (when a codec is configured for it), an 8-byte
/// primary bitmap, then fields 2..=64 in ascending order.
#[derive(Debug, Clone, Default)]
pub struct Packager {
    codecs: BTreeMap<u16, FieldCodec>,
}

impl Packager {
    /// Create a packager with no field codecs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_field(mut self, number: u16, codec: FieldCodec) -> Result<Self> {
        self.register(number, codec)?;
        Ok(self)
    }

    /// Register the codec for a field number, replacing any previous one.
    pub fn register(&mut self, number: u16, codec: FieldCodec) -> Result<()> {
        if number == BITMAP_FIELD || number > MAX_FIELD {
            return Err(FieldError::UnsupportedField(number));
        }
        self.codecs.insert(number, codec);
        Ok(())
    }

    /// Build a packager from a declarative layout.
    pub fn from_config(config: &PackagerConfig) -> Result<Self> {
        let mut packager = Self::new();
        for spec in &config.fields {
            if packager.codecs.contains_key(&spec.field) {
                return Err(FieldError::DuplicateField(spec.field));
            }
            packager.register(spec.field, spec.codec()?)?;
        }
        Ok(packager)
    }

    /// Build a packager from a JSON layout string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PackagerConfig = serde_json::from_str(json)?;
        Self::from_config(&config)
    }

    /// Load a packager from a JSON layout file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| FieldError::LoadFailed(format!("{}: {err}", path.display())))?;
        Self::from_json(&text)
    }

    /// Codec registered for `number`.
    pub fn codec(&self, number: u16) -> Option<&FieldCodec> {
        self.codecs.get(&number)
    }

    /// Registered field numbers in ascending order.
    pub fn field_numbers(&self) -> impl Iterator<Item = u16> + '_ {
        self.codecs.keys().copied()
    }

    /// Pack the fields of `msg` into a body.
    pub fn pack(&self, msg: &Message) -> Result<Vec<u8>> {
        let mut bitmap = [0u8; BITMAP_LENGTH];
        for number in msg.field_numbers() {
            match number {
                0 => {}
                BITMAP_FIELD => return Err(FieldError::UnsupportedField(number)),
                n if n > MAX_FIELD => return Err(FieldError::UnsupportedField(number)),
                n => set_bit(&mut bitmap, n),
            }
        }

        let mut dst = BytesMut::new();
        match (self.codecs.get(&0), msg.get(0)) {
            (Some(codec), Some(value)) => {
                codec.pack_into(&BinaryField::new(0, value.clone()), &mut dst)?;
            }
            (Some(_), None) => return Err(FieldError::MissingField(0)),
            (None, Some(_)) => return Err(FieldError::NoCodec(0)),
            (None, None) => {}
        }
        dst.extend_from_slice(&bitmap);

        for (number, value) in msg.fields().filter(|(number, _)| *number > BITMAP_FIELD) {
            let codec = self
                .codecs
                .get(&number)
                .ok_or(FieldError::NoCodec(number))?;
            codec.pack_into(&BinaryField::new(number, value.clone()), &mut dst)?;
            trace!(field = number, len = value.len(), "packed field");
        }

        Ok(dst.to_vec())
    }

    /// Unpack a body into a new message.
    ///
    /// The whole input must be consumed.
    pub fn unpack(&self, src: &[u8]) -> Result<Message> {
        let mut msg = Message::new();
        let mut offset = 0usize;

        if let Some(codec) = self.codecs.get(&0) {
            let mut field = BinaryField::empty(0);
            offset += codec.unpack(&mut field, src, offset)?;
            msg.set_field(field);
        }

        let available = src.len() - offset;
        if available < BITMAP_LENGTH {
            return Err(FieldError::Truncated {
                field: BITMAP_FIELD,
                needed: BITMAP_LENGTH,
                available,
            });
        }
        let mut bitmap = [0u8; BITMAP_LENGTH];
        bitmap.copy_from_slice(&src[offset..offset + BITMAP_LENGTH]);
        offset += BITMAP_LENGTH;

        // Secondary bitmaps are not supported.
        if is_set(&bitmap, BITMAP_FIELD) {
            return Err(FieldError::UnsupportedField(BITMAP_FIELD));
        }

        for number in (BITMAP_FIELD + 1)..=MAX_FIELD {
            if !is_set(&bitmap, number) {
                continue;
            }
            let codec = self
                .codecs
                .get(&number)
                .ok_or(FieldError::NoCodec(number))?;
            let mut field = BinaryField::empty(number);
            let consumed = codec.unpack(&mut field, src, offset)?;
            trace!(field = number, consumed, "unpacked field");
            offset += consumed;
            msg.set_field(field);
        }

        if offset != src.len() {
            return Err(FieldError::TrailingBytes(src.len() - offset));
        }
        Ok(msg)
    }
}

fn set_bit(bitmap: &mut [u8; BITMAP_LENGTH], number: u16) {
    let idx = usize::from(number - 1);
    bitmap[idx / 8] |= 0x80 >> (idx % 8);
}

fn is_set(bitmap: &[u8; BITMAP_LENGTH], number: u16) -> bool {
    let idx = usize::from(number - 1);
    bitmap[idx / 8] & (0x80 >> (idx % 8)) != 0
}
