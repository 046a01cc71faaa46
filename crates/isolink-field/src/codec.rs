use bytes::{BufMut, Bytes, BytesMut};
use isolink_frame::bcd::{bcd_to_u32, u32_to_bcd};
use isolink_frame::FrameError;
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, Result};
use crate::field::BinaryField;

/// Largest capacity a length-prefixed raw field can declare (3 digits).
pub const LLL_MAX_LENGTH: usize = 999;

/// Size of the packed-decimal length prefix of a length-prefixed raw field.
const LLL_PREFIX_SIZE: usize = 2;

/// Wire encoding of a binary field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldEncoding {
    /// Exactly `capacity` bytes, each rendered as two ASCII hex digits.
    FixedHex,
    /// 0..=`capacity` raw bytes behind a 2-byte packed-decimal length.
    LllBinary,
}

/// Immutable codec descriptor for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCodec {
    max_len: usize,
    description: String,
    encoding: FieldEncoding,
}

impl FieldCodec {
    /// Build a codec, validating the capacity against the encoding.
    pub fn new(encoding: FieldEncoding, max_len: usize, description: impl Into<String>) -> Result<Self> {
        if encoding == FieldEncoding::LllBinary && max_len > LLL_MAX_LENGTH {
            return Err(FieldError::CapacityOutOfRange {
                max: max_len,
                limit: LLL_MAX_LENGTH,
            });
        }
        Ok(Self {
            max_len,
            description: description.into(),
            encoding,
        })
    }

    /// Fixed-length hex codec for values of exactly `len` bytes.
    pub fn fixed_hex(len: usize, description: impl Into<String>) -> Self {
        Self {
            max_len: len,
            description: description.into(),
            encoding: FieldEncoding::FixedHex,
        }
    }

    /// Length-prefixed raw codec for values of up to `max_len` bytes.
    pub fn lll_binary(max_len: usize, description: impl Into<String>) -> Result<Self> {
        Self::new(FieldEncoding::LllBinary, max_len, description)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn encoding(&self) -> FieldEncoding {
        self.encoding
    }

    /// Pack a field into a fresh buffer.
    pub fn pack(&self, field: &BinaryField) -> Result<Vec<u8>> {
        let mut dst = BytesMut::new();
        self.pack_into(field, &mut dst)?;
        Ok(dst.to_vec())
    }

    /// Pack a field, appending the wire bytes to `dst`.
    ///
    /// Nothing is appended when the value violates the codec capacity.
    pub fn pack_into(&self, field: &BinaryField, dst: &mut BytesMut) -> Result<()> {
        let value = field.value();
        match self.encoding {
            FieldEncoding::FixedHex => {
                if value.len() != self.max_len {
                    return Err(FieldError::LengthMismatch {
                        field: field.number(),
                        expected: self.max_len,
                        actual: value.len(),
                    });
                }
                dst.put_slice(hex::encode_upper(value).as_bytes());
            }
            FieldEncoding::LllBinary => {
                if value.len() > self.max_len {
                    return Err(FieldError::TooLong {
                        field: field.number(),
                        max: self.max_len,
                        actual: value.len(),
                    });
                }
                let prefix = u32_to_bcd(value.len() as u32, 3).map_err(|_| FieldError::TooLong {
                    field: field.number(),
                    max: LLL_MAX_LENGTH,
                    actual: value.len(),
                })?;
                dst.reserve(LLL_PREFIX_SIZE + value.len());
                dst.put_slice(&prefix);
                dst.put_slice(value);
            }
        }
        Ok(())
    }

    /// Unpack one field from `src` starting at `offset` and store the value
    /// in `field`. Returns the number of bytes consumed.
    pub fn unpack(&self, field: &mut BinaryField, src: &[u8], offset: usize) -> Result<usize> {
        let number = field.number();
        let available = src.len().saturating_sub(offset);
        match self.encoding {
            FieldEncoding::FixedHex => {
                let needed = 2 * self.max_len;
                if available < needed {
                    return Err(FieldError::Truncated {
                        field: number,
                        needed,
                        available,
                    });
                }
                let mut value = vec![0u8; self.max_len];
                hex::decode_to_slice(&src[offset..offset + needed], &mut value)
                    .map_err(|_| FieldError::InvalidHex { field: number })?;
                field.set_value(value);
                Ok(needed)
            }
            FieldEncoding::LllBinary => {
                if available < LLL_PREFIX_SIZE {
                    return Err(FieldError::Truncated {
                        field: number,
                        needed: LLL_PREFIX_SIZE,
                        available,
                    });
                }
                let len = match bcd_to_u32(&src[offset..offset + LLL_PREFIX_SIZE]) {
                    Ok(len) => len as usize,
                    Err(FrameError::InvalidBcd(byte)) => {
                        return Err(FieldError::InvalidBcd {
                            field: number,
                            byte,
                        })
                    }
                    Err(_) => return Err(FieldError::InvalidBcd { field: number, byte: 0 }),
                };
                if len > self.max_len {
                    return Err(FieldError::TooLong {
                        field: number,
                        max: self.max_len,
                        actual: len,
                    });
                }
                let needed = LLL_PREFIX_SIZE + len;
                if available < needed {
                    return Err(FieldError::Truncated {
                        field: number,
                        needed,
                        available,
                    });
                }
                let start = offset + LLL_PREFIX_SIZE;
                field.set_value(Bytes::copy_from_slice(&src[start..start + len]));
                Ok(needed)
            }
        }
    }
}
