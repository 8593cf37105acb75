//! Synthetic container images for integration tests.
//!
//! Builds `.utoc`/`.ucas` byte images the same way the engine's packager
//! lays them out: content split into fixed-size blocks, each optionally
//! compressed, padded to the AES block size and encrypted.

use std::io::Write;

use iostore_container::IoChunkId;
use iostore_crypto::aes;

const NONE_ENTRY: u32 = u32::MAX;
const METHOD_NAME_LENGTH: usize = 32;

/// One file entry for [`dir_index_blob`]. `dir: None` places the file in
/// the root directory.
pub struct DirFile {
    pub dir: Option<&'static str>,
    pub name: &'static str,
    pub chunk: u32,
}

pub struct ContainerBuilder {
    version: u8,
    block_size: u32,
    partition_count: u32,
    partition_size: u64,
    container_id: u64,
    method: &'static str,
    encryption: Option<([u8; 16], [u8; 32])>,
    signed: bool,
    stream: Vec<u8>,
    chunks: Vec<(IoChunkId, u64, u64)>,
    directory: Option<Vec<u8>>,
}

impl ContainerBuilder {
    pub fn new(block_size: u32) -> Self {
        Self {
            version: 3,
            block_size,
            partition_count: 1,
            partition_size: 0,
            container_id: 0x1122_3344_5566_7788,
            method: "None",
            encryption: None,
            signed: false,
            stream: Vec::new(),
            chunks: Vec::new(),
            directory: None,
        }
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn partitions(mut self, count: u32, size: u64) -> Self {
        self.partition_count = count;
        self.partition_size = size;
        self
    }

    /// The combined uncompressed content stream the blocks will cover.
    pub fn stream(mut self, stream: Vec<u8>) -> Self {
        self.stream = stream;
        self
    }

    pub fn method(mut self, method: &'static str) -> Self {
        self.method = method;
        self
    }

    pub fn encrypted(mut self, guid: [u8; 16], key: [u8; 32]) -> Self {
        self.encryption = Some((guid, key));
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn chunk(mut self, id: IoChunkId, offset: u64, length: u64) -> Self {
        self.chunks.push((id, offset, length));
        self
    }

    pub fn directory(mut self, blob: Vec<u8>) -> Self {
        self.directory = Some(blob);
        self
    }

    /// Build a single-partition container.
    pub fn build_single(self) -> (Vec<u8>, Vec<u8>) {
        let (utoc, mut partitions) = self.build();
        assert_eq!(partitions.len(), 1);
        (utoc, partitions.remove(0))
    }

    /// Build the `.utoc` image and one buffer per partition.
    pub fn build(self) -> (Vec<u8>, Vec<Vec<u8>>) {
        let routing_size = if self.partition_size > 0 {
            self.partition_size
        } else {
            u64::MAX
        };

        // Lay the stream out as blocks in the content partitions.
        let method_index: u8 = if self.method == "None" { 0 } else { 1 };
        let mut partitions: Vec<Vec<u8>> =
            vec![Vec::new(); self.partition_count.max(1) as usize];
        let mut blocks = Vec::new();
        let mut logical = 0u64;

        for part in self.stream.chunks(self.block_size as usize) {
            let payload = if method_index == 0 {
                part.to_vec()
            } else {
                zlib_compress(part)
            };
            let compressed_size = payload.len() as u32;

            let mut raw = payload;
            raw.resize(align16(raw.len()), 0);
            if let Some((_, key)) = &self.encryption {
                aes::encrypt_in_place(&mut raw, key).unwrap();
            }

            let partition = &mut partitions[(logical / routing_size) as usize];
            let offset_in_partition = (logical % routing_size) as usize;
            if partition.len() < offset_in_partition + raw.len() {
                partition.resize(offset_in_partition + raw.len(), 0);
            }
            partition[offset_in_partition..offset_in_partition + raw.len()]
                .copy_from_slice(&raw);

            blocks.push((logical, compressed_size, part.len() as u32, method_index));
            logical += raw.len() as u64;
        }

        // Directory blob is padded and encrypted like chunk data.
        let directory = self.directory.map(|mut blob| {
            if let Some((_, key)) = &self.encryption {
                blob.resize(align16(blob.len()), 0);
                aes::encrypt_in_place(&mut blob, key).unwrap();
            }
            blob
        });

        let mut flags = 0u8;
        if method_index != 0 {
            flags |= 1 << 0; // compressed
        }
        if self.encryption.is_some() {
            flags |= 1 << 1; // encrypted
        }
        if self.signed {
            flags |= 1 << 2; // signed
        }
        if directory.is_some() {
            flags |= 1 << 3; // indexed
        }

        let method_count: u32 = if method_index == 0 { 0 } else { 1 };
        let guid = self.encryption.map(|(g, _)| g).unwrap_or([0u8; 16]);
        let directory_size = directory.as_ref().map_or(0, Vec::len) as u32;

        let mut utoc = Vec::new();

        // Header, 144 bytes.
        utoc.extend_from_slice(b"-==--==--==--==-");
        utoc.push(self.version);
        utoc.push(0); // reserved
        utoc.extend_from_slice(&0u16.to_le_bytes()); // reserved
        utoc.extend_from_slice(&144u32.to_le_bytes());
        utoc.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());
        utoc.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
        utoc.extend_from_slice(&12u32.to_le_bytes());
        utoc.extend_from_slice(&method_count.to_le_bytes());
        utoc.extend_from_slice(&(METHOD_NAME_LENGTH as u32).to_le_bytes());
        utoc.extend_from_slice(&self.block_size.to_le_bytes());
        utoc.extend_from_slice(&directory_size.to_le_bytes());
        let (header_partition_count, header_partition_size) = if self.version >= 3 {
            (self.partition_count, self.partition_size)
        } else {
            (0, 0)
        };
        utoc.extend_from_slice(&header_partition_count.to_le_bytes());
        utoc.extend_from_slice(&self.container_id.to_le_bytes());
        utoc.extend_from_slice(&guid);
        utoc.push(flags);
        utoc.push(0); // reserved
        utoc.extend_from_slice(&0u16.to_le_bytes()); // reserved
        utoc.extend_from_slice(&0u32.to_le_bytes()); // reserved
        utoc.extend_from_slice(&header_partition_size.to_le_bytes());
        utoc.extend_from_slice(&[0u8; 48]); // reserved
        assert_eq!(utoc.len(), 144);

        // Chunk id table.
        for (id, _, _) in &self.chunks {
            utoc.extend_from_slice(id.as_bytes());
        }

        // Offset and length table, big-endian 40-bit pairs.
        for (_, offset, length) in &self.chunks {
            utoc.extend_from_slice(&offset.to_be_bytes()[3..]);
            utoc.extend_from_slice(&length.to_be_bytes()[3..]);
        }

        // Compression block descriptors.
        for (offset, compressed, uncompressed, method) in &blocks {
            let mut entry = [0u8; 12];
            entry[0..5].copy_from_slice(&offset.to_le_bytes()[..5]);
            entry[5..8].copy_from_slice(&compressed.to_le_bytes()[..3]);
            entry[8..11].copy_from_slice(&uncompressed.to_le_bytes()[..3]);
            entry[11] = *method;
            utoc.extend_from_slice(&entry);
        }

        // Method name table.
        if method_count > 0 {
            let mut slot = [0u8; METHOD_NAME_LENGTH];
            slot[..self.method.len()].copy_from_slice(self.method.as_bytes());
            utoc.extend_from_slice(&slot);
        }

        // Signature block: hash size, two hashes, one SHA-1 per block.
        if self.signed {
            utoc.extend_from_slice(&20u32.to_le_bytes());
            utoc.extend_from_slice(&[0u8; 40]);
            utoc.extend_from_slice(&vec![0u8; blocks.len() * 20]);
        }

        if let Some(blob) = &directory {
            utoc.extend_from_slice(blob);
        }

        // Meta table: hash plus flag byte per entry.
        for _ in &self.chunks {
            utoc.extend_from_slice(&[0u8; 32]);
            utoc.push(if method_index != 0 { 1 } else { 0 });
        }

        (utoc, partitions)
    }
}

/// Serialize a directory-index blob: mount point, directory entries, file
/// entries and string table.
pub fn dir_index_blob(mount: &str, files: &[DirFile]) -> Vec<u8> {
    let mut strings: Vec<&str> = Vec::new();
    let mut intern = |s: &'static str, strings: &mut Vec<&str>| -> u32 {
        if let Some(pos) = strings.iter().position(|x| *x == s) {
            return pos as u32;
        }
        strings.push(s);
        (strings.len() - 1) as u32
    };

    // Unique directory names in encounter order.
    let mut dirs: Vec<&'static str> = Vec::new();
    for file in files {
        if let Some(dir) = file.dir {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }

    // File entries, chained per directory.
    let file_of_dir = |wanted: Option<&'static str>, from: usize| -> u32 {
        files
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, f)| f.dir == wanted)
            .map_or(NONE_ENTRY, |(i, _)| i as u32)
    };

    let mut file_entries = Vec::new();
    for (i, file) in files.iter().enumerate() {
        let name = intern(file.name, &mut strings);
        file_entries.push([name, file_of_dir(file.dir, i + 1), file.chunk]);
    }

    // Directory entries: root first, then one per named directory.
    let mut dir_entries = Vec::new();
    dir_entries.push([
        NONE_ENTRY,
        if dirs.is_empty() { NONE_ENTRY } else { 1 },
        NONE_ENTRY,
        file_of_dir(None, 0),
    ]);
    for (i, dir) in dirs.iter().copied().enumerate() {
        let name = intern(dir, &mut strings);
        let next_sibling = if i + 1 < dirs.len() {
            (i + 2) as u32
        } else {
            NONE_ENTRY
        };
        dir_entries.push([name, NONE_ENTRY, next_sibling, file_of_dir(Some(dir), 0)]);
    }

    let mut blob = Vec::new();
    write_string(&mut blob, mount);

    blob.extend_from_slice(&(dir_entries.len() as u32).to_le_bytes());
    for entry in &dir_entries {
        for field in entry {
            blob.extend_from_slice(&field.to_le_bytes());
        }
    }

    blob.extend_from_slice(&(file_entries.len() as u32).to_le_bytes());
    for entry in &file_entries {
        for field in entry {
            blob.extend_from_slice(&field.to_le_bytes());
        }
    }

    blob.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in &strings {
        write_string(&mut blob, s);
    }

    blob
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&((s.len() as i32) + 1).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn align16(len: usize) -> usize {
    (len + 15) & !15
}

fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
