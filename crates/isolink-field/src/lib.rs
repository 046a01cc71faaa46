//! Binary field codecs and message packing.
//!
//! Two incompatible binary encodings are supported per field:
//! - fixed-length hex: every byte rendered as two ASCII hex digits
//! - length-prefixed raw: a 2-byte packed-decimal length, then the bytes
//!
//! [`Packager`] combines per-field codecs with a primary bitmap to pack a
//! whole [`Message`] body.

pub mod codec;
pub mod config;
pub mod error;
pub mod field;
pub mod message;
pub mod packager;

pub use codec::{FieldCodec, FieldEncoding, LLL_MAX_LENGTH};
pub use config::{FieldSpec, PackagerConfig};
pub use error::{FieldError, Result};
pub use field::BinaryField;
pub use message::Message;
pub use packager::{Packager, BITMAP_LENGTH, MAX_FIELD};
