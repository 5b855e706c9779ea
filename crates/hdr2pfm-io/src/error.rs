//! Error types for I/O operations.

use std::io;
use thiserror::Error;

/// I/O operation error.
#[derive(Debug, Error)]
pub enum IoError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or corrupted file header.
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// Malformed pixel stream.
    #[error("format error: {0}")]
    Format(String),

    /// Pixel buffer size does not fit in memory arithmetic.
    #[error("image too large to allocate: {width}x{height}")]
    Allocation {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
    },

    /// Image is not representable in the target format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for I/O operations.
pub type IoResult<T> = Result<T, IoError>;

impl IoError {
    /// True for errors caused by malformed file contents rather than the
    /// environment (disk, permissions, memory).
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            IoError::InvalidFile(_) | IoError::Format(_) | IoError::UnsupportedFormat(_)
        )
    }
}
