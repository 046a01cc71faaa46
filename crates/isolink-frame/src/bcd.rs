//! Packed-decimal (BCD) helpers: two decimal digits per byte, high nibble first.

use crate::error::{FrameError, Result};

/// Convert a string of decimal digits into packed decimal.
///
/// Odd-length input gets a zero nibble: on the left when `pad_left` is set
/// (`"123"` → `01 23`), otherwise on the right (`"123"` → `12 30`).
pub fn str_to_bcd(digits: &str, pad_left: bool) -> Result<Vec<u8>> {
    let len = digits.len();
    let mut out = vec![0u8; len.div_ceil(2)];
    let start = if pad_left && len % 2 == 1 { 1 } else { 0 };

    for (i, ch) in digits.bytes().enumerate() {
        if !ch.is_ascii_digit() {
            return Err(FrameError::InvalidHeader(format!(
                "non-decimal character {:?} at offset {i}",
                ch as char
            )));
        }
        let pos = i + start;
        let nibble = ch - b'0';
        if pos % 2 == 0 {
            out[pos / 2] |= nibble << 4;
        } else {
            out[pos / 2] |= nibble;
        }
    }

    Ok(out)
}

/// Decode packed decimal into an unsigned number.
pub fn bcd_to_u32(bcd: &[u8]) -> Result<u32> {
    let mut value = 0u32;
    for &byte in bcd {
        let (hi, lo) = (byte >> 4, byte & 0x0F);
        if hi > 9 || lo > 9 {
            return Err(FrameError::InvalidBcd(byte));
        }
        value = value * 100 + u32::from(hi) * 10 + u32::from(lo);
    }
    Ok(value)
}

/// Encode `value` as packed decimal with exactly `digits` digits, left padded.
///
/// Returns `LengthOutOfRange` when the value needs more digits.
pub fn u32_to_bcd(value: u32, digits: usize) -> Result<Vec<u8>> {
    let text = format!("{value:0digits$}");
    if text.len() > digits {
        return Err(FrameError::LengthOutOfRange {
            len: value as usize,
            max: 10usize.pow(digits as u32) - 1,
        });
    }
    str_to_bcd(&text, true)
}
