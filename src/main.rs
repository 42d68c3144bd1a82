//! fnstarts - list the function start addresses of every loaded image.
//!
//! Walks the images dyld has mapped into this process, decodes each one's
//! `LC_FUNCTION_STARTS` table and prints every function address, named when a
//! symbol starts exactly there.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use fnstarts::ScanOptions;

/// List function start addresses of every image loaded in this process.
#[derive(Parser, Debug)]
#[command(name = "fnstarts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Only report images whose path contains this substring
    #[arg(short, long)]
    filter: Option<String>,

    /// Print bare addresses without looking up symbol names
    #[arg(long)]
    no_symbols: bool,

    /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, default_value = "1")]
    verbosity: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    let options = ScanOptions {
        filter: cli.filter,
        resolve_symbols: !cli.no_symbols,
    };

    cmd_dump(&options)
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

#[cfg(target_os = "macos")]
fn cmd_dump(options: &ScanOptions) -> Result<()> {
    use std::io::Write;

    use fnstarts::dyld::{CurrentProcess, DyldImageDirectory};
    use fnstarts::report::TextReporter;
    use fnstarts::symbols::DladdrResolver;
    use tracing::warn;

    // SAFETY: nothing in this process unloads images while the scan runs.
    let process = unsafe { CurrentProcess::new() };
    let mut reporter = TextReporter::new(io::BufWriter::new(io::stdout().lock()));

    let summary = fnstarts::dump_function_starts(
        &DyldImageDirectory,
        &process,
        &DladdrResolver,
        &mut reporter,
        options,
    )
    .context("Failed to write report")?;

    reporter
        .into_inner()
        .context("Failed to flush report")?
        .flush()?;

    let faults = summary.faults().count();
    if faults > 0 {
        warn!(
            "{} of {} images were skipped",
            faults,
            summary.images.len()
        );
    }

    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn cmd_dump(_options: &ScanOptions) -> Result<()> {
    anyhow::bail!("Enumerating loaded images requires dyld; this platform is not supported");
}
