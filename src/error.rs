//! Error types for function-starts recovery.
//!
//! Almost every variant here describes a structural fault in a single image:
//! a load command that runs off the end of the command list, a table that
//! escapes `__LINKEDIT`, a truncated ULEB128, an address outside `__text`.
//! Those abort the current image only. The pipeline logs them and moves on.

use thiserror::Error;

/// The main error type for function-starts recovery.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    /// Writing the report failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Memory Errors ====================
    /// The address space refused a read.
    #[error("cannot read {len:#x} bytes at {addr:#x}")]
    UnreadableMemory {
        /// Start of the requested range
        addr: u64,
        /// Length of the requested range
        len: usize,
    },

    /// A structure was read from a buffer shorter than the structure.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes the structure needs
        needed: usize,
        /// Bytes the buffer holds
        available: usize,
    },

    // ==================== Mach-O Errors ====================
    /// The header does not start with `MH_MAGIC_64`.
    #[error("invalid Mach-O magic: {0:#x}")]
    InvalidMachoMagic(u32),

    /// A load command runs past the end of the command list.
    #[error("load command at offset {offset:#x} extends beyond the command list ({sizeofcmds:#x} bytes)")]
    LoadCommandOverflow {
        /// Offset of the command within the command list
        offset: usize,
        /// Size of the command list from the header
        sizeofcmds: u32,
    },

    /// A load command is smaller than its own header or its fixed layout.
    #[error("load command at offset {offset:#x} has invalid size {cmdsize:#x}")]
    InvalidCommandSize {
        /// Offset of the command within the command list
        offset: usize,
        /// Size the command declares
        cmdsize: u32,
    },

    /// A segment declares more sections than its command holds.
    #[error("segment '{segment}' at offset {offset:#x} declares {nsects} sections but its command is only {cmdsize:#x} bytes")]
    SectionsOverflow {
        /// Segment name
        segment: String,
        /// Offset of the command within the command list
        offset: usize,
        /// Declared section count
        nsects: u32,
        /// Size the command declares
        cmdsize: u32,
    },

    /// Relocating a segment or section wrapped the address space.
    #[error("segment '{segment}' bounds overflow the address space")]
    SegmentBoundsOverflow {
        /// Segment name
        segment: String,
    },

    // ==================== Function Starts Errors ====================
    /// `LC_FUNCTION_STARTS` appears before any `__LINKEDIT` segment.
    #[error("LC_FUNCTION_STARTS at offset {offset:#x} precedes the __LINKEDIT segment")]
    FunctionStartsBeforeLinkedit {
        /// Offset of the command within the command list
        offset: usize,
    },

    /// The image has a function-starts table but no `__LINKEDIT`.
    #[error("image has function starts but no __LINKEDIT segment")]
    MissingLinkedit,

    /// The image has a function-starts table but no `__TEXT,__text`.
    #[error("image has function starts but no __TEXT,__text section")]
    MissingCodeRegion,

    /// The table's file offset lies before `__LINKEDIT`'s.
    #[error("function starts data offset {dataoff:#x} lies before __LINKEDIT file offset {linkedit_fileoff:#x}")]
    TableBeforeLinkedit {
        /// File offset of the table
        dataoff: u64,
        /// File offset of `__LINKEDIT`
        linkedit_fileoff: u64,
    },

    /// The table's runtime span ends past `__LINKEDIT`.
    #[error("function starts span {start:#x}..{end:#x} escapes __LINKEDIT {linkedit_start:#x}..{linkedit_end:#x}")]
    TableOutsideLinkedit {
        /// Runtime start of the table
        start: u64,
        /// Runtime end of the table
        end: u64,
        /// Runtime start of `__LINKEDIT`
        linkedit_start: u64,
        /// Runtime end of `__LINKEDIT`
        linkedit_end: u64,
    },

    /// A delta runs past the end of the table.
    #[error("truncated ULEB128 at table offset {offset:#x}")]
    TruncatedUleb128 {
        /// Offset of the delta within the table
        offset: usize,
    },

    /// A delta does not fit in 64 bits.
    #[error("ULEB128 at table offset {offset:#x} exceeds 64 bits")]
    Uleb128Overflow {
        /// Offset of the delta within the table
        offset: usize,
    },

    /// Adding a delta overflowed the running address.
    #[error("function address overflows after {address:#x} + {delta:#x}")]
    AddressOverflow {
        /// Running address before the delta
        address: u64,
        /// The delta
        delta: u64,
    },

    /// A decoded address lies outside `__text`.
    #[error("function address {addr:#x} lies outside __text {start:#x}..{end:#x}")]
    AddressOutsideCode {
        /// The decoded address
        addr: u64,
        /// Runtime start of `__text`
        start: u64,
        /// Runtime end of `__text`
        end: u64,
    },
}

/// A specialized Result type for function-starts recovery.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error is confined to a single image.
    ///
    /// Structural faults skip the current image. Anything else (currently
    /// only a failing report writer) aborts the whole run.
    #[inline]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Error::Io(_))
    }

    /// Creates a buffer too small error.
    #[inline]
    pub fn buffer_too_small(needed: usize, available: usize) -> Self {
        Error::BufferTooSmall { needed, available }
    }

    /// Creates an address-outside-code error.
    #[inline]
    pub fn outside_code(addr: u64, start: u64, end: u64) -> Self {
        Error::AddressOutsideCode { addr, start, end }
    }
}
