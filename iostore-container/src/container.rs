//! Container mounting and chunk extraction.
//!
//! A container is a `.utoc` table-of-contents sidecar plus one `.ucas`
//! content file per partition. Mounting parses the TOC and opens every
//! partition; reads then translate a chunk's logical range into a series
//! of block reads with decryption, decompression and copy-out.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::directory_index::DirectoryIndex;
use crate::error::{ContainerError, Result};
use crate::partition::PartitionSource;
use crate::toc::{Toc, TocReadOptions};
use crate::types::{ContainerFlags, ContainerId, IoChunkId};
use iostore_crypto::{aes, KeyGuid, KeyService};

/// Cooperative cancellation for long chunk reads.
///
/// Checked between blocks; an in-flight block read is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A mounted, read-only container.
///
/// All TOC tables are immutable after mounting, so reads need no locking
/// and may run from multiple threads. Partition handles are owned by the
/// container and released when it is dropped.
#[derive(Debug)]
pub struct IoStoreContainer {
    toc: Toc,
    partitions: Vec<PartitionSource>,
    encryption_key: Option<[u8; 32]>,
    directory_index: OnceLock<Option<DirectoryIndex>>,
    directory_index_blob: Mutex<Option<Vec<u8>>>,
}

impl IoStoreContainer {
    /// Mount a container from `<base>.utoc` and its partition files
    /// (`<base>.ucas`, `<base>_s1.ucas`, ...).
    ///
    /// When the container is encrypted, the key named by the TOC header
    /// must be present in `keys`.
    pub fn mount(
        base: impl AsRef<Path>,
        keys: &KeyService,
        options: TocReadOptions,
    ) -> Result<Self> {
        let base = base.as_ref();

        let toc_path = path_with_suffix(base, ".utoc");
        let toc_data =
            std::fs::read(&toc_path).map_err(|source| ContainerError::ContainerOpenFailed {
                path: toc_path.clone(),
                source,
            })?;
        let toc = Toc::read(&toc_data, options)?;

        let mut partitions = Vec::with_capacity(toc.header().partition_count as usize);
        for i in 0..toc.header().partition_count {
            let path = if i == 0 {
                path_with_suffix(base, ".ucas")
            } else {
                path_with_suffix(base, &format!("_s{i}.ucas"))
            };
            let file = File::open(&path)
                .map_err(|source| ContainerError::ContainerOpenFailed { path, source })?;
            partitions.push(PartitionSource::File(file));
        }

        debug!(
            "Mounted container {} from {} ({} partitions)",
            toc.header().container_id,
            base.display(),
            partitions.len()
        );

        Self::assemble(toc, partitions, keys)
    }

    /// Mount a single-partition container from in-memory TOC and content
    /// buffers.
    pub fn mount_from_memory(
        utoc: &[u8],
        ucas: Vec<u8>,
        keys: &KeyService,
        options: TocReadOptions,
    ) -> Result<Self> {
        let toc = Toc::read(utoc, options)?;

        let partition_count = toc.header().partition_count;
        if partition_count > 1 {
            return Err(ContainerError::Unsupported(format!(
                "in-memory mount supports a single partition, container has {partition_count}"
            )));
        }

        Self::assemble(toc, vec![PartitionSource::Memory(ucas)], keys)
    }

    fn assemble(
        mut toc: Toc,
        partitions: Vec<PartitionSource>,
        keys: &KeyService,
    ) -> Result<Self> {
        let encryption_key = if toc.header().container_flags.is_encrypted() {
            let guid = toc.header().encryption_key_guid;
            let key = keys
                .get_key(&guid)
                .ok_or(ContainerError::MissingKey(guid))?;
            Some(*key)
        } else {
            None
        };

        let directory_index_blob = Mutex::new(toc.take_directory_index());

        Ok(Self {
            toc,
            partitions,
            encryption_key,
            directory_index: OnceLock::new(),
            directory_index_blob,
        })
    }

    pub fn container_id(&self) -> ContainerId {
        self.toc.header().container_id
    }

    pub fn container_flags(&self) -> ContainerFlags {
        self.toc.header().container_flags
    }

    pub fn encryption_key_guid(&self) -> KeyGuid {
        self.toc.header().encryption_key_guid
    }

    pub fn chunk_count(&self) -> u32 {
        self.toc.header().toc_entry_count
    }

    pub fn compression_methods(&self) -> &[String] {
        self.toc.compression_methods()
    }

    /// The parsed table of contents.
    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    /// A chunk's offset and length in the uncompressed content stream.
    pub fn offset_and_length(&self, chunk_id: &IoChunkId) -> Option<(u64, u64)> {
        self.toc.offset_and_length(chunk_id)
    }

    /// Read a chunk's full uncompressed content.
    pub fn read(&self, chunk_id: &IoChunkId) -> Result<Vec<u8>> {
        self.read_internal(chunk_id, None)
    }

    /// Read a chunk, checking `token` between blocks.
    pub fn read_cancellable(
        &self,
        chunk_id: &IoChunkId,
        token: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.read_internal(chunk_id, Some(token))
    }

    fn read_internal(
        &self,
        chunk_id: &IoChunkId,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<u8>> {
        let (offset, length) = self
            .toc
            .offset_and_length(chunk_id)
            .ok_or(ContainerError::UnknownChunk(*chunk_id))?;

        trace!("Reading chunk {} ({} bytes at {})", chunk_id, length, offset);

        if length == 0 {
            return Ok(Vec::new());
        }

        let header = self.toc.header();
        let block_size = header.compression_block_size as u64;
        let partition_size = header.partition_size;
        let blocks = self.toc.compression_blocks();
        let methods = self.toc.compression_methods();

        let first_block = offset / block_size;
        let last_block = (align_up(offset + length, block_size) - 1) / block_size;
        if last_block as usize >= blocks.len() {
            return Err(ContainerError::CorruptToc(format!(
                "chunk {chunk_id} needs block {last_block} but the TOC has {}",
                blocks.len()
            )));
        }

        let mut dst = vec![0u8; length as usize];
        let mut offset_in_block = (offset % block_size) as usize;
        let mut remaining = length as usize;
        let mut dst_cursor = 0usize;

        // Scratch buffers reused across the block loop.
        let mut raw = Vec::new();
        let mut decompressed = Vec::new();

        for block_index in first_block..=last_block {
            if token.is_some_and(CancellationToken::is_cancelled) {
                return Err(ContainerError::Cancelled);
            }

            let block = blocks[block_index as usize];

            // The on-disk frame is padded to the AES block size.
            let raw_size = align_up(block.compressed_size as u64, 16) as usize;
            raw.resize(raw_size, 0);

            let partition_index = (block.offset / partition_size) as usize;
            let partition_offset = block.offset % partition_size;
            let partition = self.partitions.get(partition_index).ok_or_else(|| {
                ContainerError::CorruptToc(format!(
                    "block {block_index} routes to partition {partition_index} of {}",
                    self.partitions.len()
                ))
            })?;
            partition.read_exact_at(partition_offset, &mut raw)?;

            if let Some(key) = &self.encryption_key {
                aes::decrypt_in_place(&mut raw, key)?;
            }

            let uncompressed_size = block.uncompressed_size as usize;
            let source: &[u8] = if block.compression_method_index == 0 {
                &raw
            } else {
                let method = methods
                    .get(block.compression_method_index as usize)
                    .ok_or_else(|| {
                        ContainerError::CorruptToc(format!(
                            "block {block_index} references compression method {} of {}",
                            block.compression_method_index,
                            methods.len()
                        ))
                    })?;
                decompressed.resize(uncompressed_size, 0);
                iostore_compression::decompress_block(
                    method,
                    &raw[..block.compressed_size as usize],
                    &mut decompressed,
                )?;
                &decompressed
            };

            let copy_len = remaining.min(block_size as usize - offset_in_block);
            if offset_in_block + copy_len > source.len() {
                return Err(ContainerError::CorruptToc(format!(
                    "block {block_index} holds {} bytes, chunk {chunk_id} needs {}",
                    source.len(),
                    offset_in_block + copy_len
                )));
            }

            dst[dst_cursor..dst_cursor + copy_len]
                .copy_from_slice(&source[offset_in_block..offset_in_block + copy_len]);

            offset_in_block = 0;
            remaining -= copy_len;
            dst_cursor += copy_len;
        }

        Ok(dst)
    }

    /// Enumerate `(path, chunk_id)` pairs from the directory index.
    ///
    /// Returns an empty list when the container carries no index.
    pub fn list_files(&self) -> Result<Vec<(String, IoChunkId)>> {
        let mut files = Vec::new();
        self.iterate_files(&mut |path, chunk_id| {
            files.push((path.to_string(), chunk_id));
            true
        })?;
        Ok(files)
    }

    /// Walk the directory index depth-first, stopping early when `visit`
    /// returns `false`. Returns whether the walk ran to completion.
    pub fn iterate_files<F>(&self, visit: &mut F) -> Result<bool>
    where
        F: FnMut(&str, IoChunkId) -> bool,
    {
        let Some(index) = self.directory_index()? else {
            return Ok(true);
        };

        let chunk_ids = self.toc.chunk_ids();
        let mut bad_entry = None;
        let completed = index.iterate(&mut |path, user_data| {
            match chunk_ids.get(user_data as usize) {
                Some(chunk_id) => visit(path, *chunk_id),
                None => {
                    bad_entry = Some(user_data);
                    false
                }
            }
        })?;

        if let Some(user_data) = bad_entry {
            return Err(ContainerError::CorruptToc(format!(
                "directory index references chunk entry {user_data} of {}",
                chunk_ids.len()
            )));
        }

        Ok(completed)
    }

    /// Build the directory index on first use.
    ///
    /// The raw blob is released once parsed; a parse failure is terminal.
    fn directory_index(&self) -> Result<Option<&DirectoryIndex>> {
        if let Some(index) = self.directory_index.get() {
            return Ok(index.as_ref());
        }

        let mut blob = self.directory_index_blob.lock();

        // Another thread may have won the race while we waited.
        if let Some(index) = self.directory_index.get() {
            return Ok(index.as_ref());
        }

        let built = match blob.take() {
            Some(bytes) => Some(DirectoryIndex::parse(
                bytes,
                self.toc.header().container_flags,
                self.encryption_key.as_ref(),
            )?),
            None => None,
        };

        let _ = self.directory_index.set(built);
        Ok(self
            .directory_index
            .get()
            .expect("directory index just initialized")
            .as_ref())
    }
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

fn path_with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_os_string();
    path.push(suffix);
    PathBuf::from(path)
}
