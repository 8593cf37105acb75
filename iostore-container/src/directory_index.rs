//! Directory-index reader.
//!
//! The directory index maps file paths to chunk-id table positions. It is
//! serialized as a mount-point string, two entry arrays and a string
//! table, and is encrypted the same way as chunk data when the container
//! is encrypted.

use std::io::Cursor;

use tracing::debug;

use crate::error::{ContainerError, Result};
use crate::ioutils::{read_array, read_string, ReadInt};
use crate::types::ContainerFlags;
use iostore_crypto::aes;

/// Sentinel for "no entry" in the cross-reference fields.
const NONE_ENTRY: u32 = u32::MAX;

/// Index of the root directory entry.
const ROOT_DIRECTORY: u32 = 0;

#[derive(Debug, Clone)]
struct DirectoryEntry {
    name: u32,
    first_child_entry: u32,
    next_sibling_entry: u32,
    first_file_entry: u32,
}

#[derive(Debug, Clone)]
struct FileEntry {
    name: u32,
    next_file_entry: u32,
    /// Position in the TOC chunk-id table.
    user_data: u32,
}

/// Parsed directory index.
#[derive(Debug)]
pub struct DirectoryIndex {
    mount_point: String,
    directory_entries: Vec<DirectoryEntry>,
    file_entries: Vec<FileEntry>,
    string_table: Vec<String>,
}

impl DirectoryIndex {
    /// Parse a directory index from its (possibly encrypted) blob.
    ///
    /// `key` must be the container key when `flags` has the encrypted bit;
    /// the blob length is a multiple of 16 by construction in that case.
    pub fn parse(
        mut blob: Vec<u8>,
        flags: ContainerFlags,
        key: Option<&[u8; 32]>,
    ) -> Result<Self> {
        if flags.is_encrypted() {
            let key = key.ok_or_else(|| {
                ContainerError::Unsupported(
                    "encrypted directory index without a container key".into(),
                )
            })?;
            aes::decrypt_in_place(&mut blob, key)?;
        }

        let mut cursor = Cursor::new(blob.as_slice());

        let mount_point = read_string(&mut cursor)?;

        let directory_entries = read_array(&mut cursor, |r| {
            Ok(DirectoryEntry {
                name: r.read_u32le()?,
                first_child_entry: r.read_u32le()?,
                next_sibling_entry: r.read_u32le()?,
                first_file_entry: r.read_u32le()?,
            })
        })?;

        let file_entries = read_array(&mut cursor, |r| {
            Ok(FileEntry {
                name: r.read_u32le()?,
                next_file_entry: r.read_u32le()?,
                user_data: r.read_u32le()?,
            })
        })?;

        let string_table = read_array(&mut cursor, read_string)?;

        debug!(
            "Directory index: mount {:?}, {} directories, {} files",
            mount_point,
            directory_entries.len(),
            file_entries.len()
        );

        Ok(Self {
            mount_point,
            directory_entries,
            file_entries,
            string_table,
        })
    }

    /// The path prefix prepended to every emitted file path.
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Walk the tree depth-first from the root, calling `visit` with each
    /// file's full path and its chunk-id table position.
    ///
    /// Files of a directory are visited before its subdirectories. The
    /// walk stops early when `visit` returns `false`.
    pub fn iterate<F>(&self, visit: &mut F) -> Result<bool>
    where
        F: FnMut(&str, u32) -> bool,
    {
        if self.directory_entries.is_empty() {
            return Ok(true);
        }
        self.iterate_directory(ROOT_DIRECTORY, &self.mount_point, visit)
    }

    /// Collect every `(path, chunk_index)` pair in traversal order.
    pub fn files(&self) -> Result<Vec<(String, u32)>> {
        let mut files = Vec::with_capacity(self.file_entries.len());
        self.iterate(&mut |path, user_data| {
            files.push((path.to_string(), user_data));
            true
        })?;
        Ok(files)
    }

    fn iterate_directory<F>(&self, directory: u32, path: &str, visit: &mut F) -> Result<bool>
    where
        F: FnMut(&str, u32) -> bool,
    {
        let entry = self.directory_entry(directory)?;

        let mut file = entry.first_file_entry;
        while file != NONE_ENTRY {
            let file_entry = self.file_entry(file)?;
            let file_path = append_path(path, self.string(file_entry.name)?);
            if !visit(&file_path, file_entry.user_data) {
                return Ok(false);
            }
            file = file_entry.next_file_entry;
        }

        let mut child = entry.first_child_entry;
        while child != NONE_ENTRY {
            let child_entry = self.directory_entry(child)?;
            let child_path = append_path(path, self.string(child_entry.name)?);
            if !self.iterate_directory(child, &child_path, visit)? {
                return Ok(false);
            }
            child = child_entry.next_sibling_entry;
        }

        Ok(true)
    }

    fn directory_entry(&self, index: u32) -> Result<&DirectoryEntry> {
        self.directory_entries.get(index as usize).ok_or_else(|| {
            ContainerError::CorruptToc(format!("directory entry {index} out of range"))
        })
    }

    fn file_entry(&self, index: u32) -> Result<&FileEntry> {
        self.file_entries
            .get(index as usize)
            .ok_or_else(|| ContainerError::CorruptToc(format!("file entry {index} out of range")))
    }

    fn string(&self, index: u32) -> Result<&str> {
        self.string_table
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| {
                ContainerError::CorruptToc(format!("string table entry {index} out of range"))
            })
    }
}

/// Join a path component onto `base` with exactly one `/` between them.
///
/// Pre-existing `\` separators are canonicalized to `/`.
fn append_path(base: &str, component: &str) -> String {
    let mut path = base.replace('\\', "/");
    if !path.is_empty() && !path.ends_with('/') {
        path.push('/');
    }

    let component = component.replace('\\', "/");
    path.push_str(component.trim_start_matches('/'));
    path
}
