//! Encoding Inspection
//!
//! Summaries over serialized CLKs, without access to the schema or
//! keys that produced them. The popcount distribution is the usual
//! first sanity check of an encoding run.

use crate::serialization::{deserialize_bitarray, SerializationError};

/// The provided CLK data is invalid.
#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("no clks found")]
    Empty,

    #[error("failed to deserialize encodings: {0}")]
    Deserialize(#[from] SerializationError),
}

/// Number of set bits per serialized encoding, often shown as a
/// histogram.
pub fn encoding_popcounts(clks: &[String]) -> Result<Vec<usize>, DescribeError> {
    if clks.is_empty() {
        return Err(DescribeError::Empty);
    }
    clks.iter()
        .map(|clk| Ok(deserialize_bitarray(clk)?.count_ones()))
        .collect()
}
