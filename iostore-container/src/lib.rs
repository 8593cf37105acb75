//! Read-only parser and chunk extractor for IoStore game-asset containers.
//!
//! A container is a `.utoc` table-of-contents sidecar plus one or more
//! `.ucas` content files. Content is stored as fixed-size compression
//! blocks, optionally AES-encrypted, and addressed by 96-bit chunk ids
//! and an embedded directory index.
//!
//! Mounting a container parses the TOC once into immutable tables;
//! [`IoStoreContainer::read`] then reconstitutes any chunk's uncompressed
//! bytes on demand, and [`IoStoreContainer::list_files`] enumerates the
//! directory index.

pub mod container;
pub mod directory_index;
pub mod error;
pub(crate) mod ioutils;
pub mod partition;
pub mod toc;
pub mod types;

pub use container::{CancellationToken, IoStoreContainer};
pub use directory_index::DirectoryIndex;
pub use error::{ContainerError, Result};
pub use toc::{Toc, TocHeader, TocReadOptions, TocVersion};
pub use types::{ContainerFlags, ContainerId, IoChunkId, IoChunkType};

// Re-export the collaborating crates' entry points for convenience.
pub use iostore_compression::decompress_block;
pub use iostore_crypto::{KeyGuid, KeyService};
