//! Table-of-contents parser for `.utoc` sidecar files.
//!
//! The TOC is a sequence of fixed-layout tables: header, chunk ids,
//! offset+length records, compression-block descriptors, a method-name
//! table, an optional signature block, an optional directory-index blob
//! and an optional per-chunk meta table.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use tracing::{debug, trace};

use crate::error::{ContainerError, Result};
use crate::ioutils::ReadInt;
use crate::types::{ContainerFlags, ContainerId, IoChunkId};
use iostore_crypto::KeyGuid;

/// Magic bytes at the start of every TOC.
pub const TOC_MAGIC: [u8; 16] = *b"-==--==--==--==-";

/// On-disk size of the TOC header.
pub const TOC_HEADER_SIZE: u32 = 144;

/// On-disk size of a compression-block descriptor.
pub const COMPRESSION_BLOCK_ENTRY_SIZE: u32 = 12;

/// Partition size synthesized for TOC versions that predate partitioning.
pub const DEFAULT_PARTITION_SIZE: u64 = 0x0FFF_FFFF_FFFF_FFFF;

/// TOC format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TocVersion {
    Invalid = 0,
    Initial = 1,
    DirectoryIndex = 2,
    PartitionSize = 3,
}

impl TocVersion {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Invalid,
            1 => Self::Initial,
            2 => Self::DirectoryIndex,
            3 => Self::PartitionSize,
            _ => return None,
        })
    }
}

/// Which optional TOC tables to materialize during [`Toc::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TocReadOptions {
    /// Capture the directory-index blob for later enumeration.
    pub directory_index: bool,
    /// Read the per-chunk meta table.
    pub meta: bool,
}

impl TocReadOptions {
    /// Read every optional table.
    pub fn all() -> Self {
        Self {
            directory_index: true,
            meta: true,
        }
    }

    /// Read the directory index but not the meta table.
    pub fn with_directory_index() -> Self {
        Self {
            directory_index: true,
            meta: false,
        }
    }
}

/// Parsed TOC header.
#[derive(Debug, Clone)]
pub struct TocHeader {
    pub version: TocVersion,
    pub toc_entry_count: u32,
    pub toc_compressed_block_entry_count: u32,
    pub compression_method_name_count: u32,
    pub compression_method_name_length: u32,
    pub compression_block_size: u32,
    pub directory_index_size: u32,
    pub partition_count: u32,
    pub container_id: ContainerId,
    pub encryption_key_guid: KeyGuid,
    pub container_flags: ContainerFlags,
    pub partition_size: u64,
}

impl TocHeader {
    /// Parse and validate the 144-byte header.
    fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut magic = [0u8; 16];
        cursor
            .read_exact(&mut magic)
            .map_err(|_| ContainerError::CorruptToc("TOC shorter than its magic".into()))?;
        if magic != TOC_MAGIC {
            return Err(ContainerError::CorruptToc(format!(
                "bad TOC magic: {magic:02x?}"
            )));
        }

        let version_byte = cursor.read_u8()?;
        let version = match TocVersion::from_byte(version_byte) {
            Some(TocVersion::Invalid) | Some(TocVersion::Initial) => {
                return Err(ContainerError::CorruptToc(format!(
                    "TOC version {version_byte} predates the directory index and is not readable"
                )));
            }
            Some(version) => version,
            None => return Err(ContainerError::UnsupportedVersion(version_byte)),
        };

        let _reserved0 = cursor.read_u8()?;
        let _reserved1 = cursor.read_u16le()?;

        let toc_header_size = cursor.read_u32le()?;
        if toc_header_size != TOC_HEADER_SIZE {
            return Err(ContainerError::CorruptToc(format!(
                "TOC header size is {toc_header_size}, expected {TOC_HEADER_SIZE}"
            )));
        }

        let toc_entry_count = cursor.read_u32le()?;
        let toc_compressed_block_entry_count = cursor.read_u32le()?;

        let toc_compressed_block_entry_size = cursor.read_u32le()?;
        if toc_compressed_block_entry_size != COMPRESSION_BLOCK_ENTRY_SIZE {
            return Err(ContainerError::CorruptToc(format!(
                "compression block entry size is {toc_compressed_block_entry_size}, expected {COMPRESSION_BLOCK_ENTRY_SIZE}"
            )));
        }

        let compression_method_name_count = cursor.read_u32le()?;
        let compression_method_name_length = cursor.read_u32le()?;

        let compression_block_size = cursor.read_u32le()?;
        if compression_block_size == 0 && toc_entry_count > 0 {
            return Err(ContainerError::CorruptToc(
                "zero compression block size with a non-empty chunk table".into(),
            ));
        }
        let directory_index_size = cursor.read_u32le()?;
        let mut partition_count = cursor.read_u32le()?;

        let container_id = ContainerId::new(cursor.read_u64le()?);

        let mut guid = [0u8; 16];
        cursor.read_exact(&mut guid)?;
        let encryption_key_guid = KeyGuid::new(guid);

        let container_flags = ContainerFlags::new(cursor.read_u8()?);
        let _reserved3 = cursor.read_u8()?;
        let _reserved4 = cursor.read_u16le()?;
        let _reserved5 = cursor.read_u32le()?;

        let mut partition_size = cursor.read_u64le()?;

        for _ in 0..6 {
            let _reserved = cursor.read_u64le()?;
        }

        if version < TocVersion::PartitionSize {
            partition_count = 1;
            partition_size = DEFAULT_PARTITION_SIZE;
        } else if partition_count < 2 && partition_size == 0 {
            // Single-partition containers may leave the size unset.
            partition_count = 1;
            partition_size = DEFAULT_PARTITION_SIZE;
        } else if partition_size == 0 {
            return Err(ContainerError::CorruptToc(format!(
                "{partition_count} partitions with zero partition size"
            )));
        }

        Ok(Self {
            version,
            toc_entry_count,
            toc_compressed_block_entry_count,
            compression_method_name_count,
            compression_method_name_length,
            compression_block_size,
            directory_index_size,
            partition_count,
            container_id,
            encryption_key_guid,
            container_flags,
            partition_size,
        })
    }
}

/// A chunk's position in the combined uncompressed content stream.
///
/// Two big-endian 40-bit fields packed into 10 bytes, giving a range of
/// up to 1 PiB each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoOffsetAndLength {
    pub offset: u64,
    pub length: u64,
}

impl IoOffsetAndLength {
    pub const SIZE: usize = 10;

    pub fn from_bytes(b: [u8; Self::SIZE]) -> Self {
        let mut offset = [0u8; 8];
        offset[3..].copy_from_slice(&b[0..5]);
        let mut length = [0u8; 8];
        length[3..].copy_from_slice(&b[5..10]);
        Self {
            offset: u64::from_be_bytes(offset),
            length: u64::from_be_bytes(length),
        }
    }
}

/// Descriptor of one compression block in the content file.
///
/// Packed into 12 bytes: a 40-bit little-endian content offset, a 24-bit
/// compressed size, a 24-bit uncompressed size and the method index in
/// the final byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionBlockEntry {
    pub offset: u64,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub compression_method_index: u8,
}

impl CompressionBlockEntry {
    pub const SIZE: usize = 12;

    pub fn from_bytes(b: [u8; Self::SIZE]) -> Self {
        let mut offset = [0u8; 8];
        offset[..5].copy_from_slice(&b[0..5]);
        let offset = u64::from_le_bytes(offset);

        let mut compressed = [0u8; 4];
        compressed[..3].copy_from_slice(&b[5..8]);
        let compressed_size = u32::from_le_bytes(compressed);

        let mut uncompressed = [0u8; 4];
        uncompressed[..3].copy_from_slice(&b[8..11]);
        let uncompressed_size = u32::from_le_bytes(uncompressed);

        Self {
            offset,
            compressed_size,
            uncompressed_size,
            compression_method_index: b[11],
        }
    }
}

/// Flags carried by a [`ChunkMeta`] record.
pub mod meta_flags {
    pub const COMPRESSED: u8 = 1 << 0;
    pub const MEMORY_MAPPED: u8 = 1 << 1;
}

/// Per-chunk metadata: a content hash and a flag byte.
///
/// Only the first 20 bytes of the hash are significant. Hashes are not
/// verified by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMeta {
    pub hash: [u8; 32],
    pub flags: u8,
}

impl ChunkMeta {
    pub const SIZE: usize = 33;

    pub fn is_compressed(&self) -> bool {
        self.flags & meta_flags::COMPRESSED != 0
    }

    pub fn is_memory_mapped(&self) -> bool {
        self.flags & meta_flags::MEMORY_MAPPED != 0
    }
}

/// Parsed table of contents.
///
/// All tables are built once by [`Toc::read`] and are immutable
/// afterwards.
#[derive(Debug)]
pub struct Toc {
    header: TocHeader,
    chunk_ids: Vec<IoChunkId>,
    offsets_and_lengths: Vec<IoOffsetAndLength>,
    compression_blocks: Vec<CompressionBlockEntry>,
    compression_methods: Vec<String>,
    chunk_metas: Option<Vec<ChunkMeta>>,
    directory_index: Option<Vec<u8>>,
    chunk_index: HashMap<IoChunkId, u32>,
}

impl Toc {
    /// Parse a TOC from the raw bytes of a `.utoc` file.
    pub fn read(data: &[u8], options: TocReadOptions) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let header = TocHeader::parse(&mut cursor)?;
        debug!(
            "TOC {}: version {:?}, {} entries, {} blocks, flags {:#04x}",
            header.container_id,
            header.version,
            header.toc_entry_count,
            header.toc_compressed_block_entry_count,
            header.container_flags.bits()
        );

        // Chunk id table, and the id -> index mapping derived from it.
        // On duplicate ids the later entry wins.
        let mut chunk_ids = Vec::with_capacity(header.toc_entry_count as usize);
        let mut chunk_index = HashMap::with_capacity(header.toc_entry_count as usize);
        for i in 0..header.toc_entry_count {
            let mut id = [0u8; 12];
            cursor.read_exact(&mut id)?;
            let id = IoChunkId::new(id);
            chunk_ids.push(id);
            chunk_index.insert(id, i);
        }

        let mut offsets_and_lengths = Vec::with_capacity(header.toc_entry_count as usize);
        for _ in 0..header.toc_entry_count {
            let offset = cursor.read_u40be()?;
            let length = cursor.read_u40be()?;
            offsets_and_lengths.push(IoOffsetAndLength { offset, length });
        }

        let mut compression_blocks =
            Vec::with_capacity(header.toc_compressed_block_entry_count as usize);
        for _ in 0..header.toc_compressed_block_entry_count {
            let mut b = [0u8; CompressionBlockEntry::SIZE];
            cursor.read_exact(&mut b)?;
            compression_blocks.push(CompressionBlockEntry::from_bytes(b));
        }

        let compression_methods = Self::read_method_names(&mut cursor, &header)?;
        trace!("Compression methods: {:?}", compression_methods);

        // The combined content stream must be able to hold every chunk.
        let total_size = (header.partition_count as u64).saturating_mul(header.partition_size);
        for (i, entry) in offsets_and_lengths.iter().enumerate() {
            let end = entry.offset.checked_add(entry.length);
            if end.map_or(true, |end| end > total_size) {
                return Err(ContainerError::CorruptToc(format!(
                    "chunk {i} range {}+{} exceeds container capacity {total_size}",
                    entry.offset, entry.length
                )));
            }
        }

        if header.container_flags.is_signed() {
            Self::skip_signatures(&mut cursor, &header)?;
        }

        let directory_index = if header.container_flags.is_indexed()
            && header.directory_index_size > 0
        {
            let size = header.directory_index_size as usize;
            if options.directory_index {
                let mut blob = vec![0u8; size];
                cursor.read_exact(&mut blob)?;
                Some(blob)
            } else {
                cursor.set_position(cursor.position() + size as u64);
                None
            }
        } else {
            None
        };

        let chunk_metas = if options.meta {
            let mut metas = Vec::with_capacity(header.toc_entry_count as usize);
            for _ in 0..header.toc_entry_count {
                let mut hash = [0u8; 32];
                cursor.read_exact(&mut hash)?;
                let flags = cursor.read_u8()?;
                metas.push(ChunkMeta { hash, flags });
            }
            Some(metas)
        } else {
            None
        };

        Ok(Self {
            header,
            chunk_ids,
            offsets_and_lengths,
            compression_blocks,
            compression_methods,
            chunk_metas,
            directory_index,
            chunk_index,
        })
    }

    /// Read the method-name table. Slot 0 is always the implicit "None".
    fn read_method_names(
        cursor: &mut Cursor<&[u8]>,
        header: &TocHeader,
    ) -> Result<Vec<String>> {
        let mut methods = Vec::with_capacity(header.compression_method_name_count as usize + 1);
        methods.push(iostore_compression::METHOD_NONE.to_string());

        let mut slot = vec![0u8; header.compression_method_name_length as usize];
        for _ in 0..header.compression_method_name_count {
            cursor.read_exact(&mut slot)?;
            let end = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
            let name = std::str::from_utf8(&slot[..end]).map_err(|e| {
                ContainerError::CorruptToc(format!("compression method name is not UTF-8: {e}"))
            })?;
            methods.push(name.to_string());
        }

        Ok(methods)
    }

    /// Skip the signature block: two container hashes plus one SHA-1 per
    /// compression block. Nothing is verified.
    fn skip_signatures(cursor: &mut Cursor<&[u8]>, header: &TocHeader) -> Result<()> {
        let hash_size = cursor.read_u32le()? as u64;
        let block_signatures = header.toc_compressed_block_entry_count as u64 * 20;
        cursor.set_position(cursor.position() + hash_size * 2 + block_signatures);
        Ok(())
    }

    pub fn header(&self) -> &TocHeader {
        &self.header
    }

    pub fn chunk_ids(&self) -> &[IoChunkId] {
        &self.chunk_ids
    }

    pub fn offsets_and_lengths(&self) -> &[IoOffsetAndLength] {
        &self.offsets_and_lengths
    }

    pub fn compression_blocks(&self) -> &[CompressionBlockEntry] {
        &self.compression_blocks
    }

    pub fn compression_methods(&self) -> &[String] {
        &self.compression_methods
    }

    pub fn chunk_metas(&self) -> Option<&[ChunkMeta]> {
        self.chunk_metas.as_deref()
    }

    /// Position of a chunk id in the TOC tables.
    pub fn entry_index(&self, chunk_id: &IoChunkId) -> Option<u32> {
        self.chunk_index.get(chunk_id).copied()
    }

    /// A chunk's offset and length in the uncompressed content stream.
    pub fn offset_and_length(&self, chunk_id: &IoChunkId) -> Option<(u64, u64)> {
        let index = self.entry_index(chunk_id)?;
        let entry = self.offsets_and_lengths[index as usize];
        Some((entry.offset, entry.length))
    }

    /// Take ownership of the raw directory-index blob, if one was read.
    pub fn take_directory_index(&mut self) -> Option<Vec<u8>> {
        self.directory_index.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_length_decode() {
        // offset = 0x0102030405, length = 0x0605040302 (big-endian fields)
        let b = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x05, 0x04, 0x03, 0x02];
        let entry = IoOffsetAndLength::from_bytes(b);
        assert_eq!(entry.offset, 0x01_0203_0405);
        assert_eq!(entry.length, 0x06_0504_0302);
    }

    #[test]
    fn test_offset_and_length_max() {
        let entry = IoOffsetAndLength::from_bytes([0xFF; 10]);
        assert_eq!(entry.offset, 0xFF_FFFF_FFFF);
        assert_eq!(entry.length, 0xFF_FFFF_FFFF);
    }

    #[test]
    fn test_compression_block_decode() {
        let mut b = [0u8; 12];
        b[0..5].copy_from_slice(&[0x10, 0x20, 0x30, 0x40, 0x50]); // offset LE
        b[5..8].copy_from_slice(&[0xAA, 0xBB, 0xCC]); // compressed size LE
        b[8..11].copy_from_slice(&[0x11, 0x22, 0x33]); // uncompressed size LE
        b[11] = 7; // method index

        let entry = CompressionBlockEntry::from_bytes(b);
        assert_eq!(entry.offset, 0x50_4030_2010);
        assert_eq!(entry.compressed_size, 0xCC_BBAA);
        assert_eq!(entry.uncompressed_size, 0x33_2211);
        assert_eq!(entry.compression_method_index, 7);
    }

    #[test]
    fn test_compression_block_offset_masked_to_40_bits() {
        // Bytes 5..8 belong to the compressed size, not the offset.
        let mut b = [0u8; 12];
        b[0..5].copy_from_slice(&[0xFF; 5]);
        b[5..8].copy_from_slice(&[0x01, 0x00, 0x00]);

        let entry = CompressionBlockEntry::from_bytes(b);
        assert_eq!(entry.offset, 0xFF_FFFF_FFFF);
        assert_eq!(entry.compressed_size, 1);
    }

    #[test]
    fn test_chunk_meta_flags() {
        let meta = ChunkMeta {
            hash: [0u8; 32],
            flags: meta_flags::COMPRESSED,
        };
        assert!(meta.is_compressed());
        assert!(!meta.is_memory_mapped());
    }

    #[test]
    fn test_toc_version_ordering() {
        assert!(TocVersion::DirectoryIndex < TocVersion::PartitionSize);
        assert_eq!(TocVersion::from_byte(4), None);
    }
}
