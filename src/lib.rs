//! fnstarts - function start addresses of every image loaded in this process.
//!
//! The linker records the entry point of every function it lays out in the
//! `LC_FUNCTION_STARTS` table, a compact ULEB128 delta list stored in
//! `__LINKEDIT`. Unlike the symbol table it survives stripping, which makes it
//! a ground-truth list of function boundaries for profilers and security
//! tooling.
//!
//! For each image dyld has loaded this crate:
//!
//! - scans the image's load commands for `__TEXT`, `__text`, `__LINKEDIT` and
//!   `LC_FUNCTION_STARTS`, relocating them by the image's slide
//! - locates the table inside `__LINKEDIT` and checks it lies entirely within
//! - decodes the table from the start of `__TEXT`
//! - checks every decoded address lies inside `__text`
//! - names each address whose symbol starts exactly there
//!
//! A malformed image is skipped with a diagnostic; the run always continues
//! with the next image.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(target_os = "macos")]
//! fn main() -> fnstarts::Result<()> {
//!     use fnstarts::{dump_function_starts, ScanOptions};
//!     use fnstarts::dyld::{CurrentProcess, DyldImageDirectory};
//!     use fnstarts::report::TextReporter;
//!     use fnstarts::symbols::DladdrResolver;
//!
//!     // SAFETY: images stay loaded for the duration of the scan.
//!     let process = unsafe { CurrentProcess::new() };
//!     let mut reporter = TextReporter::new(std::io::stdout().lock());
//!
//!     let summary = dump_function_starts(
//!         &DyldImageDirectory,
//!         &process,
//!         &DladdrResolver,
//!         &mut reporter,
//!         &ScanOptions::default(),
//!     )?;
//!     eprintln!("{} functions", summary.function_count());
//!     Ok(())
//! }
//! # #[cfg(not(target_os = "macos"))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dyld;
pub mod error;
pub mod function_starts;
pub mod macho;
pub mod report;
pub mod symbols;
pub mod util;

#[cfg(test)]
mod testutil;

// Re-export main types
pub use dyld::{AddressSpace, Image, ImageDirectory};
pub use error::{Error, Result};
pub use report::{FunctionAddress, Reporter};
pub use symbols::SymbolResolver;

use tracing::{debug, info, warn};

use function_starts::recover_function_starts;
use macho::{read_header, scan_load_commands, MachHeader64};
use symbols::name_at;

/// Options for a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Only report images whose path contains this substring
    pub filter: Option<String>,
    /// Look up a name for each function start
    pub resolve_symbols: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            filter: None,
            resolve_symbols: true,
        }
    }
}

/// What happened to one image.
#[derive(Debug)]
pub enum ImageOutcome {
    /// The table decoded cleanly; this many functions were reported
    Functions(usize),
    /// The image has no `LC_FUNCTION_STARTS` command
    NoFunctionStarts,
    /// The image was skipped because it failed a structural check
    Fault(Error),
}

/// Per-image result of a scan.
#[derive(Debug)]
pub struct ImageSummary {
    /// Directory index of the image
    pub index: u32,
    /// Path of the image
    pub path: String,
    /// Outcome of the image's pass
    pub outcome: ImageOutcome,
}

/// Result of a whole scan.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Every reported image, in directory order
    pub images: Vec<ImageSummary>,
    /// Indices that no longer resolved when they were reached
    pub unloaded: Vec<u32>,
}

impl RunSummary {
    /// Total functions reported across all images.
    pub fn function_count(&self) -> usize {
        self.images
            .iter()
            .map(|img| match img.outcome {
                ImageOutcome::Functions(n) => n,
                _ => 0,
            })
            .sum()
    }

    /// Images that were skipped with a structural fault.
    pub fn faults(&self) -> impl Iterator<Item = (&ImageSummary, &Error)> {
        self.images.iter().filter_map(|img| match &img.outcome {
            ImageOutcome::Fault(err) => Some((img, err)),
            _ => None,
        })
    }
}

/// Reports the function starts of every image in `directory`.
///
/// Images are processed one at a time, in directory order. A structural fault
/// in one image is logged, recorded in the summary and the image is skipped;
/// it never stops the run. Only a failing reporter aborts.
pub fn dump_function_starts<D, S, R, P>(
    directory: &D,
    space: &S,
    resolver: &R,
    reporter: &mut P,
    options: &ScanOptions,
) -> Result<RunSummary>
where
    D: ImageDirectory + ?Sized,
    S: AddressSpace + ?Sized,
    R: SymbolResolver + ?Sized,
    P: Reporter + ?Sized,
{
    let mut summary = RunSummary::default();
    let count = directory.image_count();
    info!("Scanning {} loaded images", count);

    for index in 0..count {
        let Some(base_address) = directory.image_base(index) else {
            warn!("image {} was unloaded during the scan", index);
            summary.unloaded.push(index);
            continue;
        };

        let mut image = Image {
            index,
            base_address,
            relocation_offset: directory.image_relocation(index),
            path: directory
                .image_path(index)
                .unwrap_or_else(|| "<unknown>".to_string()),
            in_shared_cache: false,
        };

        if let Some(filter) = &options.filter {
            if !image.matches_filter(filter) {
                continue;
            }
        }

        let header = space
            .read(image.base_address, MachHeader64::SIZE)
            .and_then(read_header);
        if let Ok(header) = &header {
            image.in_shared_cache = header.is_in_shared_cache();
            debug!("{}: {}", image.basename(), header);
        }

        reporter.begin_image(&image)?;

        let recovered = header.and_then(|header| image_function_starts(space, &image, &header));
        let outcome = match recovered {
            Ok(Some(addresses)) => {
                for &address in &addresses {
                    let name = if options.resolve_symbols {
                        name_at(resolver, address)
                    } else {
                        None
                    };
                    reporter.function(&FunctionAddress { address, name })?;
                }
                debug!("{}: {} function starts", image.basename(), addresses.len());
                ImageOutcome::Functions(addresses.len())
            }
            Ok(None) => {
                debug!("{}: no LC_FUNCTION_STARTS", image.basename());
                ImageOutcome::NoFunctionStarts
            }
            Err(err) if err.is_structural() => {
                warn!("{}: skipping image: {}", image.path, err);
                ImageOutcome::Fault(err)
            }
            Err(err) => return Err(err),
        };

        reporter.end_image(&image)?;

        summary.images.push(ImageSummary {
            index,
            path: image.path,
            outcome,
        });
    }

    info!(
        "Reported {} function starts from {} images ({} skipped)",
        summary.function_count(),
        summary.images.len(),
        summary.faults().count()
    );

    Ok(summary)
}

/// Scans one image's load commands and recovers its validated function list.
fn image_function_starts<S>(
    space: &S,
    image: &Image,
    header: &MachHeader64,
) -> Result<Option<Vec<u64>>>
where
    S: AddressSpace + ?Sized,
{
    let commands_addr = image
        .base_address
        .checked_add(MachHeader64::SIZE as u64)
        .ok_or(Error::UnreadableMemory {
            addr: image.base_address,
            len: MachHeader64::SIZE,
        })?;
    let commands = space.read(commands_addr, header.sizeofcmds as usize)?;

    let layout = scan_load_commands(header, commands, image.relocation_offset)?;
    recover_function_starts(space, &layout)
}
