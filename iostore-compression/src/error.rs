//! Error types for block decompression.

use thiserror::Error;

/// Result type for decompression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Decompression error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The named compression method has no registered backend.
    #[error("unsupported compression method: {0}")]
    UnsupportedCodec(String),

    /// The backend produced a different amount of data than expected.
    #[error("decompression failed ({method}): expected {expected} bytes, got {actual}")]
    DecompressFailed {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// The backend rejected the compressed stream.
    #[error("decoder error ({method}): {source}")]
    Decoder {
        method: String,
        source: std::io::Error,
    },
}
