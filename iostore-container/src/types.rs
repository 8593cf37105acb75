//! Common types used throughout the container reader.

use std::fmt;

/// Chunk identifier - 12 bytes that address a unit of container content.
///
/// The id is opaque except for the last byte, which carries the chunk type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoChunkId([u8; 12]);

impl IoChunkId {
    pub fn new(data: [u8; 12]) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() == 12 {
            let mut id = [0u8; 12];
            id.copy_from_slice(data);
            Some(Self(id))
        } else {
            None
        }
    }

    /// Build an id from its parts: a 64-bit id, a 16-bit index stored
    /// big-endian, and the chunk type in the final byte.
    pub fn from_parts(id: u64, index: u16, chunk_type: IoChunkType) -> Self {
        let mut data = [0u8; 12];
        data[0..8].copy_from_slice(&id.to_le_bytes());
        data[8..10].copy_from_slice(&index.to_be_bytes());
        data[11] = chunk_type.as_byte();
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// The raw chunk-type tag in the last byte.
    pub fn chunk_type_raw(&self) -> u8 {
        self.0[11]
    }

    /// The chunk type, if the tag byte is a known value.
    pub fn chunk_type(&self) -> Option<IoChunkType> {
        IoChunkType::from_byte(self.0[11])
    }
}

impl fmt::Display for IoChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Chunk content type, stored in the last byte of an [`IoChunkId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IoChunkType {
    Invalid = 0,
    ExportBundleData = 1,
    BulkData = 2,
    OptionalBulkData = 3,
    MemoryMappedBulkData = 4,
    ScriptObjects = 5,
    ContainerHeader = 6,
    ExternalFile = 7,
    ShaderCodeLibrary = 8,
    ShaderCode = 9,
    PackageStoreEntry = 10,
    DerivedData = 11,
    EditorDerivedData = 12,
    PackageResource = 13,
}

impl IoChunkType {
    /// Parse a chunk type from its tag byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Invalid,
            1 => Self::ExportBundleData,
            2 => Self::BulkData,
            3 => Self::OptionalBulkData,
            4 => Self::MemoryMappedBulkData,
            5 => Self::ScriptObjects,
            6 => Self::ContainerHeader,
            7 => Self::ExternalFile,
            8 => Self::ShaderCodeLibrary,
            9 => Self::ShaderCode,
            10 => Self::PackageStoreEntry,
            11 => Self::DerivedData,
            12 => Self::EditorDerivedData,
            13 => Self::PackageResource,
            _ => return None,
        })
    }

    /// Get the byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Container identifier from the TOC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Container flag set from the TOC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerFlags(u8);

impl ContainerFlags {
    pub const COMPRESSED: u8 = 1 << 0;
    pub const ENCRYPTED: u8 = 1 << 1;
    pub const SIGNED: u8 = 1 << 2;
    pub const INDEXED: u8 = 1 << 3;

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_compressed(&self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub fn is_signed(&self) -> bool {
        self.0 & Self::SIGNED != 0
    }

    pub fn is_indexed(&self) -> bool {
        self.0 & Self::INDEXED != 0
    }
}
