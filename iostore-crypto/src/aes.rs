//! AES-256-ECB block decryption.
//!
//! Container data blocks are encrypted with AES-256 in ECB mode without an
//! IV; ciphertext is always padded to the 16-byte block size.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::CryptoError;
use crate::Result;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// Decrypt a buffer in place with AES-256-ECB.
///
/// The buffer length must be a multiple of [`AES_BLOCK_SIZE`].
pub fn decrypt_in_place(data: &mut [u8], key: &[u8; AES_KEY_SIZE]) -> Result<()> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::UnalignedCipherText(data.len()));
    }

    let cipher = Aes256::new(GenericArray::from_slice(key));
    for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }

    Ok(())
}

/// Encrypt a buffer in place with AES-256-ECB.
///
/// Counterpart of [`decrypt_in_place`], used to build encrypted fixtures.
pub fn encrypt_in_place(data: &mut [u8], key: &[u8; AES_KEY_SIZE]) -> Result<()> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::UnalignedCipherText(data.len()));
    }

    let cipher = Aes256::new(GenericArray::from_slice(key));
    for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }

    Ok(())
}
