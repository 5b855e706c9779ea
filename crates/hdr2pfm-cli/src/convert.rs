//! The conversion pipeline: RGBE decode, PFM encode.

use anyhow::{Context, Result};
use hdr2pfm_io::{hdr, pfm};
use std::path::Path;
use tracing::{debug, info};

/// Runs the conversion.
///
/// The pixel buffer lives from the end of decoding to the end of encoding
/// and is dropped with the returned scope; nothing is retained between runs.
pub fn run(input: &Path, output: &Path, verbose: bool) -> Result<()> {
    info!(input = %input.display(), output = %output.display(), "Converting image");
    if verbose {
        println!("Converting {} -> {}", input.display(), output.display());
    }

    let image = hdr::read(input).with_context(|| format!("Failed to load: {}", input.display()))?;

    debug!(
        width = image.width,
        height = image.height,
        exposure = ?image.metadata.exposure,
        "Decoded RGBE pixels"
    );
    if verbose {
        println!("  {}x{}, {} channels", image.width, image.height, image.channels);
    }

    pfm::write(output, &image).with_context(|| format!("Failed to save: {}", output.display()))?;

    if verbose {
        println!("Done.");
    }
    Ok(())
}
