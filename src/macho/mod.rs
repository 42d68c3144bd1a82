//! Mach-O load command handling.
//!
//! This module provides the on-disk structures of the load commands an image
//! carries and a single-pass scanner that extracts the regions function-starts
//! recovery needs.

mod constants;
mod scanner;
mod structs;

pub use constants::*;
pub use scanner::*;
pub use structs::*;
