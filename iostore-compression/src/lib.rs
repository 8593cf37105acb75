//! Compression block decoding for IoStore containers.
//!
//! Container content is stored as fixed-size compression blocks, each
//! tagged with an index into a per-container method-name table. This crate
//! resolves method names to decompression backends.

pub mod decompress;
pub mod error;

pub use decompress::{decompress_block, is_supported, METHOD_NONE};
pub use error::{Error, Result};
