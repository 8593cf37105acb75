//! Key management service for container encryption.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::CryptoError;
use crate::keys::{parse_key_guid, parse_key_hex, KeyGuid};

/// Service for managing container encryption keys.
///
/// Keys are 256-bit AES keys addressed by the GUID embedded in the
/// container TOC header.
#[derive(Debug, Default)]
pub struct KeyService {
    keys: HashMap<KeyGuid, [u8; 32]>,
}

impl KeyService {
    /// Create a key service with no pre-loaded keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a key by GUID.
    pub fn get_key(&self, guid: &KeyGuid) -> Option<&[u8; 32]> {
        self.keys.get(guid)
    }

    /// Add a key to the service.
    pub fn add_key(&mut self, guid: KeyGuid, key: [u8; 32]) {
        self.keys.insert(guid, key);
    }

    /// Get the number of keys in the service.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Load keys from a file.
    ///
    /// Supported formats are CSV (`guid,keyhex`), TSV (`guid\tkeyhex`) and
    /// plain text (`guid keyhex [description]`), detected from the file
    /// extension or content. Lines starting with `#` or `//` are skipped.
    /// Returns the number of keys loaded.
    pub fn load_key_file(&mut self, path: &Path) -> Result<usize, CryptoError> {
        let content = fs::read_to_string(path)?;

        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let loaded = match ext {
            "csv" => self.load_delimited(&content, ','),
            "tsv" => self.load_delimited(&content, '\t'),
            _ => {
                // Auto-detect from content
                if content.contains(',') {
                    self.load_delimited(&content, ',')
                } else if content.contains('\t') {
                    self.load_delimited(&content, '\t')
                } else {
                    self.load_whitespace(&content)
                }
            }
        };

        info!("Loaded {} keys from {}", loaded, path.display());
        Ok(loaded)
    }

    /// Load keys from `guid<sep>keyhex` lines.
    fn load_delimited(&mut self, content: &str, sep: char) -> usize {
        let mut loaded = 0;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let mut parts = line.split(sep);
            let (Some(guid), Some(key_hex)) = (parts.next(), parts.next()) else {
                warn!("Skipping invalid key line {}: {}", line_num + 1, line);
                continue;
            };

            loaded += self.add_parsed(guid, key_hex, line_num);
        }

        loaded
    }

    /// Load keys from `guid keyhex [description]` lines.
    fn load_whitespace(&mut self, content: &str) -> usize {
        let mut loaded = 0;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let mut parts = line.split_whitespace();
            let (Some(guid), Some(key_hex)) = (parts.next(), parts.next()) else {
                warn!("Skipping invalid key line {}: {}", line_num + 1, line);
                continue;
            };

            loaded += self.add_parsed(guid, key_hex, line_num);
        }

        loaded
    }

    fn add_parsed(&mut self, guid: &str, key_hex: &str, line_num: usize) -> usize {
        match (parse_key_guid(guid), parse_key_hex(key_hex)) {
            (Ok(guid), Ok(key)) => {
                self.add_key(guid, key);
                1
            }
            (Err(e), _) => {
                warn!("Failed to parse key GUID on line {}: {}", line_num + 1, e);
                0
            }
            (_, Err(e)) => {
                warn!("Failed to parse key hex on line {}: {}", line_num + 1, e);
                0
            }
        }
    }
}
