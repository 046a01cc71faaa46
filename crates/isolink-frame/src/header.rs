//! Transport header (TPDU) handling.
//!
//! A TPDU is a 5-byte routing prefix: one id byte followed by a 2-byte
//! destination and a 2-byte source station address.

use bytes::{BufMut, BytesMut};

use crate::bcd::str_to_bcd;
use crate::error::Result;

/// Length of a TPDU header eligible for address swapping.
pub const TPDU_LENGTH: usize = 5;

/// Exchange the destination/source address pair of a 5-byte TPDU in place.
///
/// Byte 0 is left untouched. Returns `false` (and leaves the buffer alone)
/// when the header is not exactly [`TPDU_LENGTH`] bytes.
pub fn swap_tpdu(header: &mut [u8]) -> bool {
    if header.len() != TPDU_LENGTH {
        return false;
    }
    let (left, right) = header[1..].split_at_mut(2);
    left.swap_with_slice(right);
    true
}

/// Write the transport header for one outgoing message.
///
/// The message's own header wins over `default_header`. When `swap` is set
/// and the message header is a TPDU, its address pair is swapped in place
/// before writing, so the caller's buffer changes on every call. Returns the
/// number of header bytes written.
pub fn write_header(
    dst: &mut BytesMut,
    message_header: Option<&mut [u8]>,
    default_header: Option<&[u8]>,
    swap: bool,
) -> usize {
    match message_header {
        Some(header) => {
            if swap {
                swap_tpdu(header);
            }
            dst.put_slice(header);
            header.len()
        }
        None => match default_header {
            Some(header) => {
                dst.put_slice(header);
                header.len()
            }
            None => 0,
        },
    }
}

/// Convert an operator-facing decimal header string (e.g. `"6000010000"`)
/// into its packed-decimal bytes.
pub fn parse_header(text: &str) -> Result<Vec<u8>> {
    str_to_bcd(text.trim(), false)
}
