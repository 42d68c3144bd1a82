//! `LC_FUNCTION_STARTS` table decoding.
//!
//! The table is a run of ULEB128 deltas. The first delta is the offset of the
//! first function from the start of `__TEXT`; each later delta is the distance
//! from the previous function. A `0x00` byte where a new delta would begin
//! ends the table (the linker pads the table with zeros to pointer alignment).

use crate::error::{Error, Result};
use crate::util::{read_uleb128_at, write_uleb128};

/// Lazily decodes a function-starts table into absolute addresses.
///
/// Yields addresses in table order, which is non-decreasing. After the first
/// error the decoder is exhausted.
#[derive(Debug, Clone)]
pub struct FunctionStartsDecoder<'a> {
    data: &'a [u8],
    cursor: usize,
    address: u64,
    done: bool,
}

impl<'a> FunctionStartsDecoder<'a> {
    /// Creates a decoder over `data`, accumulating deltas from `origin`.
    pub fn new(data: &'a [u8], origin: u64) -> Self {
        Self {
            data,
            cursor: 0,
            address: origin,
            done: false,
        }
    }

    /// Returns the number of table bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn step(&mut self) -> Option<Result<u64>> {
        match self.data.get(self.cursor) {
            None | Some(0) => return None,
            Some(_) => {}
        }

        let (delta, consumed) = match read_uleb128_at(self.data, self.cursor) {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };

        let Some(address) = self.address.checked_add(delta) else {
            return Some(Err(Error::AddressOverflow {
                address: self.address,
                delta,
            }));
        };

        self.cursor += consumed;
        self.address = address;
        Some(Ok(address))
    }
}

impl Iterator for FunctionStartsDecoder<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

impl std::iter::FusedIterator for FunctionStartsDecoder<'_> {}

/// Encodes ascending `addresses` as a function-starts table relative to
/// `origin`, terminated by a zero byte.
///
/// Zero deltas are written in the two-byte form `0x80 0x00` so they are not
/// read back as the terminator. Returns `None` if the addresses are not
/// sorted or start before `origin`.
pub fn encode_function_starts(origin: u64, addresses: &[u64]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(addresses.len() * 2 + 1);
    let mut previous = origin;

    for &address in addresses {
        match address.checked_sub(previous)? {
            0 => out.extend_from_slice(&[0x80, 0x00]),
            delta => write_uleb128(delta, &mut out),
        }
        previous = address;
    }

    out.push(0);
    Some(out)
}
