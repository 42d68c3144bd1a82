//! Function-starts recovery for a single image.
//!
//! Given the layout the command scanner produced, locate the encoded table in
//! `__LINKEDIT`, decode it from the start of `__TEXT` and check every address
//! against `__text`. An image either yields its complete, validated list or
//! an error; a partial list is never returned.

mod decoder;
mod validate;

pub use decoder::*;
pub use validate::*;

use tracing::debug;

use crate::dyld::AddressSpace;
use crate::error::{Error, Result};
use crate::macho::ImageLayout;

/// Recovers the function start addresses of one image.
///
/// Returns `Ok(None)` when the image has no `LC_FUNCTION_STARTS` command.
pub fn recover_function_starts<S>(space: &S, layout: &ImageLayout) -> Result<Option<Vec<u64>>>
where
    S: AddressSpace + ?Sized,
{
    let Some(table) = layout.function_starts else {
        return Ok(None);
    };
    let linkedit = layout.linkedit.ok_or(Error::MissingLinkedit)?;
    let code = layout.code.ok_or(Error::MissingCodeRegion)?;
    let origin = layout.text_segment_start.ok_or(Error::MissingCodeRegion)?;

    let span = locate_table(&linkedit, &table)?;
    let len = usize::try_from(table.size).map_err(|_| Error::UnreadableMemory {
        addr: span.start,
        len: usize::MAX,
    })?;
    let data = space.read(span.start, len)?;

    debug!(
        "function starts at {:#x}..{:#x}, origin {:#x}, __text {:#x}..{:#x}",
        span.start, span.end, origin, code.runtime_start, code.runtime_end
    );

    let addresses = FunctionStartsDecoder::new(data, origin)
        .map(|decoded| decoded.and_then(|addr| check_address(&code, addr)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(addresses))
}
