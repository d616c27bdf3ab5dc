//! Cryptographic Key Material Module
//!
//! This module provides the key-derivation subsystem for CLK encoding:
//! - HKDF (RFC 5869) expansion of master secrets into per-field keys
//! - The legacy key scheme kept for reproducing historical encodings
//! - The `KeySet` structure consumed by the Bloom encoder

pub mod key_derivation;

// Re-export main types
pub use key_derivation::{
    derive_key_lists, HashAlgorithm, Kdf, KdfConfig, KeySet, DEFAULT_KEY_SIZE,
};

/// Cryptographic error types
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported key derivation function: {0}")]
    UnsupportedKdf(String),

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("expected a pair of keys per field, key set holds {0} per field")]
    KeyCount(usize),

    #[error("no keys derived for field index {0}")]
    MissingFieldKeys(usize),
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
