//! Encryption support for IoStore containers.
//!
//! This crate provides:
//! - Key management for container encryption keys, addressed by GUID
//! - AES-256-ECB decryption of container data blocks
//! - Key file loading from multiple formats

pub mod aes;
pub mod error;
pub mod key_service;
pub mod keys;

pub use error::CryptoError;
pub use key_service::KeyService;
pub use keys::KeyGuid;

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
