//! Small binary-data helpers shared by the command scanner and the decoder.
//!
//! - Unaligned little-endian reads (via byteorder)
//! - NUL-terminated fixed-width name handling (via memchr)
//! - ULEB128 reading and writing

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

// =============================================================================
// Unaligned Reads
// =============================================================================

/// Reads a little-endian u32 from a byte slice at the given offset.
///
/// # Panics
///
/// Panics if `offset + 4 > data.len()`.
#[inline(always)]
pub fn read_u32_le_at(data: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&data[offset..])
}

// =============================================================================
// Fixed-Width Names
// =============================================================================

/// Finds the position of the first null byte in a slice.
#[inline(always)]
pub fn memchr_null(data: &[u8]) -> usize {
    memchr::memchr(0, data).unwrap_or(data.len())
}

/// Interprets a null-padded name field (`segname`, `sectname`) as a string.
///
/// A field that fills all 16 bytes has no terminator. Invalid UTF-8 yields an
/// empty string, which never matches a name we look for.
#[inline]
pub fn fixed_name(field: &[u8]) -> &str {
    std::str::from_utf8(&field[..memchr_null(field)]).unwrap_or("")
}

// =============================================================================
// ULEB128
// =============================================================================

/// Reads an unsigned LEB128 value starting at `offset`.
///
/// Returns the decoded value and the number of bytes consumed. A value whose
/// continuation bit is still set at the end of `data` is truncated; a value
/// with significant bits past bit 63 overflows. Both report `offset`, the
/// position the value started at.
#[inline]
pub fn read_uleb128_at(data: &[u8], offset: usize) -> Result<(u64, usize)> {
    let bytes = data
        .get(offset..)
        .filter(|rest| !rest.is_empty())
        .ok_or(Error::TruncatedUleb128 { offset })?;

    let b0 = bytes[0];

    // Fast path: single byte (0-127)
    if b0 < 0x80 {
        return Ok((b0 as u64, 1));
    }

    let mut result: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in bytes.iter().enumerate() {
        let low = (byte & 0x7F) as u64;
        if shift >= 64 || (shift == 63 && low > 1) {
            return Err(Error::Uleb128Overflow { offset });
        }

        result |= low << shift;
        shift += 7;

        if byte < 0x80 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::TruncatedUleb128 { offset })
}

/// Writes an unsigned LEB128 value to a buffer.
pub fn write_uleb128(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}
