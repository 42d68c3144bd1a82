//! Containment checks for the function-starts table and its addresses.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::macho::{CodeRegion, FunctionStartsTable, LinkeditRegion};

/// Maps the table's file location to its runtime span inside `__LINKEDIT`.
///
/// `__LINKEDIT` is mapped contiguously, so a file offset inside it lands at
///
/// ```text
/// runtime = linkedit.runtime_start + (table.file_offset - linkedit.file_offset)
/// ```
///
/// The subtraction must not go negative and the whole span must lie within
/// `[linkedit.runtime_start, linkedit.runtime_end]`. This check runs before
/// any table byte is read.
pub fn locate_table(linkedit: &LinkeditRegion, table: &FunctionStartsTable) -> Result<Range<u64>> {
    let delta = table
        .file_offset
        .checked_sub(linkedit.file_offset)
        .ok_or(Error::TableBeforeLinkedit {
            dataoff: table.file_offset,
            linkedit_fileoff: linkedit.file_offset,
        })?;

    let escapes = |start: u64, end: u64| Error::TableOutsideLinkedit {
        start,
        end,
        linkedit_start: linkedit.runtime_start,
        linkedit_end: linkedit.runtime_end,
    };

    let start = linkedit
        .runtime_start
        .checked_add(delta)
        .ok_or_else(|| escapes(u64::MAX, u64::MAX))?;
    let end = start
        .checked_add(table.size)
        .ok_or_else(|| escapes(start, u64::MAX))?;

    if end > linkedit.runtime_end {
        return Err(escapes(start, end));
    }

    Ok(start..end)
}

/// Checks that a decoded function address lies within `__text`.
#[inline]
pub fn check_address(code: &CodeRegion, addr: u64) -> Result<u64> {
    if code.contains(addr) {
        Ok(addr)
    } else {
        Err(Error::outside_code(
            addr,
            code.runtime_start,
            code.runtime_end,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINKEDIT: LinkeditRegion = LinkeditRegion {
        runtime_start: 0x1_0000_8000,
        runtime_end: 0x1_0000_9000,
        file_offset: 0x8000,
    };

    #[test]
    fn test_locate_table() {
        let table = FunctionStartsTable {
            file_offset: 0x8100,
            size: 0x40,
        };
        assert_eq!(
            locate_table(&LINKEDIT, &table).unwrap(),
            0x1_0000_8100..0x1_0000_8140
        );
    }

    #[test]
    fn test_table_may_end_at_linkedit_end() {
        let table = FunctionStartsTable {
            file_offset: 0x8F00,
            size: 0x100,
        };
        assert_eq!(locate_table(&LINKEDIT, &table).unwrap().end, LINKEDIT.runtime_end);
    }

    #[test]
    fn test_table_partially_outside_linkedit() {
        let table = FunctionStartsTable {
            file_offset: 0x8F00,
            size: 0x200,
        };
        assert!(matches!(
            locate_table(&LINKEDIT, &table),
            Err(Error::TableOutsideLinkedit {
                start: 0x1_0000_8F00,
                end: 0x1_0000_9100,
                ..
            })
        ));
    }

    #[test]
    fn test_table_before_linkedit() {
        let table = FunctionStartsTable {
            file_offset: 0x7000,
            size: 0x10,
        };
        assert!(matches!(
            locate_table(&LINKEDIT, &table),
            Err(Error::TableBeforeLinkedit { .. })
        ));
    }

    #[test]
    fn test_table_size_overflow() {
        let table = FunctionStartsTable {
            file_offset: 0x8000,
            size: u64::MAX,
        };
        assert!(matches!(
            locate_table(&LINKEDIT, &table),
            Err(Error::TableOutsideLinkedit { .. })
        ));
    }

    #[test]
    fn test_check_address() {
        let code = CodeRegion {
            runtime_start: 0x1000,
            runtime_end: 0x2000,
        };
        assert_eq!(check_address(&code, 0x1000).unwrap(), 0x1000);
        assert_eq!(check_address(&code, 0x1FFF).unwrap(), 0x1FFF);
        assert!(matches!(
            check_address(&code, 0x2000),
            Err(Error::AddressOutsideCode { addr: 0x2000, .. })
        ));
        assert!(check_address(&code, 0xFFF).is_err());
    }
}
