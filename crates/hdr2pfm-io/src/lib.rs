//! # hdr2pfm-io
//!
//! Image I/O for the `hdr2pfm` converter.
//!
//! Two format modules, each with free `read`/`write` functions over a path:
//!
//! - [`hdr`] - Radiance RGBE, flat or RLE-compressed scanlines
//! - [`pfm`] - Portable Float Map, uncompressed 32-bit floats
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hdr2pfm_io::{hdr, pfm};
//!
//! let image = hdr::read("probe.hdr")?;
//! pfm::write("probe.pfm", &image)?;
//! ```
//!
//! Pixel data is linear radiance, stored as one contiguous `Vec<f32>` in
//! row-major top-down order. Neither module applies color-space conversion,
//! exposure, or tone mapping; the converter is a value-preserving transcode.
//!
//! | Format | Read | Write | Pixels | Notes |
//! |--------|------|-------|--------|-------|
//! | HDR | Yes | Yes | RGBE, shared exponent | RLE and flat scanlines |
//! | PFM | Yes | Yes | f32 triples | Scale sign encodes byte order |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod error;

pub mod hdr;
pub mod pfm;

pub use error::{IoError, IoResult};

/// Image data container for I/O operations.
///
/// Holds linear floating-point pixels in row-major order, top row first,
/// channels interleaved per pixel.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Number of channels (3 for RGB, 1 for grayscale).
    pub channels: u32,
    /// Pixel samples, `width * height * channels` floats.
    pub data: Vec<f32>,
    /// Header metadata carried alongside the pixels.
    pub metadata: Metadata,
}

/// Image metadata.
///
/// Captured from format headers; never applied to pixel values.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Color space name (e.g. "linear", "xyz").
    pub colorspace: Option<String>,
    /// Cumulative exposure factor from the header.
    pub exposure: Option<f32>,
    /// Gamma value if declared.
    pub gamma: Option<f32>,
    /// Pixel aspect ratio if declared.
    pub pixaspect: Option<f32>,
    /// Emitting software, when recorded.
    pub software: Option<String>,
    /// Unrecognized header variables, in file order.
    pub attrs: Vec<(String, String)>,
}

impl ImageData {
    /// Creates ImageData from f32 pixel data.
    ///
    /// `data` must hold `width * height * channels` samples.
    pub fn from_f32(width: u32, height: u32, channels: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * channels as usize
        );
        Self {
            width,
            height,
            channels,
            data,
            metadata: Metadata::default(),
        }
    }

    /// Returns the total number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Returns the total number of samples (pixels * channels).
    pub fn sample_count(&self) -> usize {
        (self.width * self.height * self.channels) as usize
    }
}
