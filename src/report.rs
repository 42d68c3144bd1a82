//! Report output.
//!
//! The text format is line oriented:
//!
//! ```text
//! 0x100000000 [  0] /path/to/binary 0x0
//! 0x100000460   _main
//! 0x100000490
//!
//! 0x18A2D4000 [  1] /usr/lib/libSystem.B.dylib 0x9A2D4000 [DyldSharedCache]
//! ...
//! ```
//!
//! Addresses are upper-case hex without padding. A function line carries a
//! name only when a symbol starts exactly at that address.

use std::io::Write;

use crate::dyld::Image;
use crate::error::Result;

/// A recovered function start, optionally named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionAddress {
    /// Absolute runtime address
    pub address: u64,
    /// Symbol starting exactly at `address`, if any
    pub name: Option<String>,
}

/// Receives the per-image and per-function records of a run.
pub trait Reporter {
    /// Called once per image, before its functions.
    fn begin_image(&mut self, image: &Image) -> Result<()>;

    /// Called for each function of the current image, in address order.
    fn function(&mut self, function: &FunctionAddress) -> Result<()>;

    /// Called after the last function of the current image.
    fn end_image(&mut self, image: &Image) -> Result<()>;
}

/// Writes the human-readable text report.
#[derive(Debug)]
pub struct TextReporter<W: Write> {
    out: W,
}

impl<W: Write> TextReporter<W> {
    /// Creates a reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn begin_image(&mut self, image: &Image) -> Result<()> {
        writeln!(
            self.out,
            "{:#X} [{:3}] {} {:#X}{}",
            image.base_address,
            image.index,
            image.path,
            image.relocation_offset,
            if image.in_shared_cache {
                " [DyldSharedCache]"
            } else {
                ""
            }
        )?;
        Ok(())
    }

    fn function(&mut self, function: &FunctionAddress) -> Result<()> {
        match &function.name {
            Some(name) => writeln!(self.out, "{:#X}   {}", function.address, name)?,
            None => writeln!(self.out, "{:#X}", function.address)?,
        }
        Ok(())
    }

    fn end_image(&mut self, _image: &Image) -> Result<()> {
        writeln!(self.out)?;
        Ok(())
    }
}
