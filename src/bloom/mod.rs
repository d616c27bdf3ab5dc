//! Bloom Filter Encoding Module
//!
//! The heart of the encoder: maps the token streams of one record into
//! a fixed-length bit vector using keyed double hashing, then applies
//! the optional XOR folding. Also provides:
//! - The bit-addressable `BitVector` backing every CLK
//! - Per-field insertion strategies (bits per token / per feature)
//! - XOR folding of finished filters

pub mod encoder;
pub mod filter;
pub mod folding;
pub mod strategy;

// Re-export main types
pub use encoder::{encode_record, EncodedRecord};
pub use filter::BitVector;
pub use folding::{fold_xor, FoldError};
pub use strategy::InsertionStrategy;

use crate::crypto::CryptoError;
use crate::fields::InvalidEntry;

/// Errors raised while encoding a single record.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("row {row_index}: {source}")]
    Entry {
        row_index: usize,
        #[source]
        source: InvalidEntry,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Fold(#[from] FoldError),

    #[error("hashing failed: {0}")]
    Hash(String),
}
