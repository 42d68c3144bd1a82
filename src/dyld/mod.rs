//! Images loaded by dyld into the current process.
//!
//! This module provides the two views the scanner needs of a running process:
//! the directory of loaded images (base address, path, slide) and bounded
//! reads of the memory those images are mapped into. Both are traits so the
//! pipeline can run over synthetic images in tests.

mod images;
mod memory;

pub use images::*;
pub use memory::*;
