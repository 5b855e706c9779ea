//! hdr2pfm - Radiance HDR (RGBE) to Portable Float Map converter

use clap::Parser;
use hdr2pfm_io::IoError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod convert;

#[derive(Parser)]
#[command(name = "hdr2pfm")]
#[command(author, version, about = "Convert Radiance HDR (RGBE) images to Portable Float Map")]
#[command(long_about = "
Reads a Radiance RGBE image (flat or RLE scanlines) and writes the decoded
linear floats out unchanged as a binary Portable Float Map.

Examples:
  hdr2pfm probe.hdr probe.pfm
  hdr2pfm -v probe.hdr probe.pfm
  RUST_LOG=debug hdr2pfm probe.hdr probe.pfm
")]
struct Cli {
    /// Input Radiance HDR file
    input: PathBuf,

    /// Output PFM file
    output: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    // Wrong or missing arguments print the usage text and exit 0. Scripts
    // built around this converter treat the usage message as a clean stop.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    init_logging(cli.verbose);

    match convert::run(&cli.input, &cli.output, cli.verbose) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("hdr2pfm: {err:#}");
            exit_code(&err)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Malformed input exits 2 so callers can tell a corrupt file from an
/// environment failure, which keeps the historical -1 (status 255).
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<IoError>() {
        Some(io_err) if io_err.is_format() => ExitCode::from(2),
        _ => ExitCode::from(255),
    }
}
