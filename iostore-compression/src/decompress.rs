//! Decompression dispatch by method name.
//!
//! Containers carry a per-TOC table of compression method names; blocks
//! reference the table by index. Dispatch is by name so that a container
//! only needs backends for the methods it actually uses.

use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};
use tracing::trace;

use crate::{Error, Result};

/// Method name for uncompressed blocks, implied by method index 0.
pub const METHOD_NONE: &str = "None";

/// Decompress one block into `dst`.
///
/// `dst.len()` is the expected uncompressed size; producing any other
/// amount is an error. Method names compare ASCII-case-insensitively
/// because TOC tables carry engine-cased names.
pub fn decompress_block(method: &str, src: &[u8], dst: &mut [u8]) -> Result<()> {
    trace!(
        "Decompressing {} bytes -> {} bytes with {}",
        src.len(),
        dst.len(),
        method
    );

    if method.eq_ignore_ascii_case("none") {
        return copy_raw(method, src, dst);
    }
    if method.eq_ignore_ascii_case("zlib") {
        return read_exactly(method, ZlibDecoder::new(src), dst);
    }
    if method.eq_ignore_ascii_case("gzip") {
        return read_exactly(method, GzDecoder::new(src), dst);
    }
    if method.eq_ignore_ascii_case("lz4") {
        return decompress_lz4(method, src, dst);
    }
    if method.eq_ignore_ascii_case("brotli") {
        return read_exactly(method, brotli::Decompressor::new(src, 4096), dst);
    }

    // Oodle and anything else we have no backend for.
    Err(Error::UnsupportedCodec(method.to_string()))
}

/// Whether a backend is registered for a method name.
pub fn is_supported(method: &str) -> bool {
    ["none", "zlib", "gzip", "lz4", "brotli"]
        .iter()
        .any(|m| method.eq_ignore_ascii_case(m))
}

fn copy_raw(method: &str, src: &[u8], dst: &mut [u8]) -> Result<()> {
    if src.len() < dst.len() {
        return Err(Error::DecompressFailed {
            method: method.to_string(),
            expected: dst.len(),
            actual: src.len(),
        });
    }
    dst.copy_from_slice(&src[..dst.len()]);
    Ok(())
}

fn decompress_lz4(method: &str, src: &[u8], dst: &mut [u8]) -> Result<()> {
    let written = lz4_flex::decompress_into(src, dst).map_err(|e| Error::Decoder {
        method: method.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    if written != dst.len() {
        return Err(Error::DecompressFailed {
            method: method.to_string(),
            expected: dst.len(),
            actual: written,
        });
    }
    Ok(())
}

/// Drain `decoder` into `dst` and require it to end exactly there.
fn read_exactly<R: Read>(method: &str, mut decoder: R, dst: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < dst.len() {
        let n = decoder.read(&mut dst[filled..]).map_err(|e| Error::Decoder {
            method: method.to_string(),
            source: e,
        })?;
        if n == 0 {
            return Err(Error::DecompressFailed {
                method: method.to_string(),
                expected: dst.len(),
                actual: filled,
            });
        }
        filled += n;
    }

    // The stream must not have more to give.
    let mut probe = [0u8; 1];
    let extra = decoder.read(&mut probe).map_err(|e| Error::Decoder {
        method: method.to_string(),
        source: e,
    })?;
    if extra != 0 {
        return Err(Error::DecompressFailed {
            method: method.to_string(),
            expected: dst.len(),
            actual: dst.len() + extra,
        });
    }

    Ok(())
}
