//! Error types for container operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::IoChunkId;
use iostore_crypto::KeyGuid;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt TOC: {0}")]
    CorruptToc(String),

    #[error("unsupported TOC version: {0}")]
    UnsupportedVersion(u8),

    #[error("missing encryption key: {0}")]
    MissingKey(KeyGuid),

    #[error("unknown chunk: {0}")]
    UnknownChunk(IoChunkId),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("failed to open container file {path}: {source}")]
    ContainerOpenFailed { path: PathBuf, source: io::Error },

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("read cancelled")]
    Cancelled,

    #[error("decompression error: {0}")]
    Compression(#[from] iostore_compression::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] iostore_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, ContainerError>;
