//! Privacy-preserving record linkage encoder.
//!
//! Transforms rows of personally identifiable information into
//! Cryptographic Longterm Keys (CLKs): fixed-length bit vectors whose
//! pairwise Hamming similarity approximates the similarity of the
//! underlying records. Two parties encode with a shared schema and
//! shared secrets; a third party can then compare the CLKs without
//! ever seeing the raw values.

// Organized modules
pub mod bloom;
pub mod comparators;
pub mod crypto;
pub mod describe;
pub mod fields;
pub mod pipeline;
pub mod schema;
pub mod serialization;
pub mod stats;


// Re-export main types for easy access
pub use bloom::{
    encode_record, fold_xor, BitVector, EncodedRecord, EncodingError, InsertionStrategy,
};
pub use comparators::{Comparison, ComparatorError, NumericComparison};
pub use crypto::{derive_key_lists, CryptoError, HashAlgorithm, Kdf, KdfConfig, KeySet};
pub use describe::{encoding_popcounts, DescribeError};
pub use fields::{FieldFormat, FieldSpec, InvalidEntry, MissingValue};
pub use pipeline::{
    encode_records, validate_header, validate_row_lengths, EncodeOptions, FormatError,
    PipelineError,
};
pub use schema::{HashType, Schema, SchemaError};
pub use serialization::{
    deserialize_bitarray, serialize_bitarray, serialize_record, SerializationError,
};
pub use stats::{popcount_vector, OnlineMeanVariance, StatsError};
