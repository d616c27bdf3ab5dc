//! CLK Serialization
//!
//! Bit vectors travel as base64 text: big-endian packed bytes, standard
//! alphabet, padded. Consumers typically collect them into a
//! `{"clks": [...]}` JSON document.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::bloom::{BitVector, EncodedRecord};

/// Serialization error types
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("failed to decode base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Serialize a bit vector (Bloom filter) to a base64 string.
pub fn serialize_bitarray(bits: &BitVector) -> String {
    BASE64.encode(bits.as_bytes())
}

/// Deserialize a base64 string back into a bit vector.
pub fn deserialize_bitarray(serialized: &str) -> Result<BitVector, SerializationError> {
    Ok(BitVector::from_bytes(BASE64.decode(serialized.trim())?))
}

/// The base64 form of one encoded record's filter.
pub fn serialize_record(record: &EncodedRecord) -> String {
    serialize_bitarray(&record.bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_bitarray(num_bytes: usize) -> BitVector {
        let mut bytes = vec![0u8; num_bytes];
        rand::thread_rng().fill_bytes(&mut bytes);
        BitVector::from_bytes(bytes)
    }

    #[test]
    fn test_round_trip() {
        for num_bytes in [1usize, 16, 128, 127] {
            let bits = random_bitarray(num_bytes);
            let serialized = serialize_bitarray(&bits);
            assert_eq!(deserialize_bitarray(&serialized).unwrap(), bits);
        }
    }

    #[test]
    fn test_serialized_length() {
        // Base64 turns every started group of 3 bytes into 4 characters.
        let num_bytes = 128;
        let serialized = serialize_bitarray(&random_bitarray(num_bytes));
        assert_eq!(serialized.len(), num_bytes.div_ceil(3) * 4);
    }

    #[test]
    fn test_known_value() {
        let bits = BitVector::from_bytes(vec![0x00, 0x01, 0x02]);
        assert_eq!(serialize_bitarray(&bits), "AAEC");
    }

    #[test]
    fn test_trailing_newline_tolerated() {
        let bits = random_bitarray(12);
        let mut serialized = serialize_bitarray(&bits);
        serialized.push('\n');
        assert_eq!(deserialize_bitarray(&serialized).unwrap(), bits);
    }

    #[test]
    fn test_malformed_base64() {
        assert!(deserialize_bitarray("*** definitely not base64 ***").is_err());
    }
}
