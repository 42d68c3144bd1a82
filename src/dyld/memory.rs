//! Bounded reads of image memory.

use crate::error::{Error, Result};

/// Read access to the memory that loaded images are mapped into.
pub trait AddressSpace {
    /// Returns the `len` bytes starting at runtime address `addr`.
    fn read(&self, addr: u64, len: usize) -> Result<&[u8]>;
}

/// The address space of the current process.
///
/// Reads are plain loads from the given addresses. The pipeline only asks for
/// a header at an image base reported by dyld, the command list that header
/// describes, and a function-starts span already checked to lie inside the
/// image's `__LINKEDIT` segment.
#[derive(Debug)]
pub struct CurrentProcess {
    _private: (),
}

impl CurrentProcess {
    /// Creates a reader over this process's own memory.
    ///
    /// # Safety
    ///
    /// Every address passed to [`AddressSpace::read`] must point at `len`
    /// readable bytes that stay mapped for the lifetime of the returned
    /// slice. Images must not be unloaded while a scan is in progress.
    ///
    /// Lengths come from the images themselves: the command list is read at
    /// the `sizeofcmds` its header declares. Only images dyld has already
    /// validated and mapped satisfy this. A corrupt header in such an image
    /// faults the whole process rather than the one image.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl AddressSpace for CurrentProcess {
    fn read(&self, addr: u64, len: usize) -> Result<&[u8]> {
        let unreadable = Error::UnreadableMemory { addr, len };
        if addr == 0 {
            return Err(unreadable);
        }
        let Ok(start) = usize::try_from(addr) else {
            return Err(unreadable);
        };
        if start.checked_add(len).is_none() || len > isize::MAX as usize {
            return Err(unreadable);
        }

        // SAFETY: upheld by the contract of `CurrentProcess::new`.
        Ok(unsafe { std::slice::from_raw_parts(start as *const u8, len) })
    }
}
