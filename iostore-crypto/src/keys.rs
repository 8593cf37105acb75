//! Key identifiers and parsing helpers.

use std::fmt;

use crate::error::CryptoError;

/// GUID identifying an encryption key, as stored in a container TOC.
///
/// On disk this is 16 bytes holding four little-endian `u32` words. The
/// textual form is the 32-digit concatenation of those words, matching the
/// format key lists are distributed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyGuid([u8; 16]);

impl KeyGuid {
    pub fn new(data: [u8; 16]) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() == 16 {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(data);
            Some(Self(guid))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// A zero GUID, used by unencrypted containers.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// The four little-endian `u32` words making up this GUID.
    fn words(&self) -> [u32; 4] {
        let mut words = [0u32; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut b = [0u8; 4];
            b.copy_from_slice(&self.0[i * 4..i * 4 + 4]);
            *word = u32::from_le_bytes(b);
        }
        words
    }
}

impl fmt::Display for KeyGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.words();
        write!(f, "{a:08X}{b:08X}{c:08X}{d:08X}")
    }
}

/// Parse a key GUID from its textual form.
///
/// Accepts 32 hex digits, optionally with dashes and an `0x` prefix.
pub fn parse_key_guid(s: &str) -> Result<KeyGuid, CryptoError> {
    let cleaned: String = s
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| *c != '-')
        .collect();

    if cleaned.len() != 32 {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "expected 32 hex digits for key GUID, got {}",
            cleaned.len()
        )));
    }

    let mut guid = [0u8; 16];
    for (i, word) in guid.chunks_exact_mut(4).enumerate() {
        let digits = &cleaned[i * 8..i * 8 + 8];
        let value = u32::from_str_radix(digits, 16)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("bad GUID digits: {e}")))?;
        word.copy_from_slice(&value.to_le_bytes());
    }

    Ok(KeyGuid(guid))
}

/// Parse a 256-bit AES key from a hex string.
pub fn parse_key_hex(s: &str) -> Result<[u8; 32], CryptoError> {
    let cleaned = s.trim().trim_start_matches("0x");

    let bytes = hex::decode(cleaned)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("bad key hex: {e}")))?;

    bytes
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidKeySize {
            expected: 32,
            actual: v.len(),
        })
}
