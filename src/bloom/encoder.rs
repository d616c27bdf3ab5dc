//! Keyed Bloom Filter Encoder
//!
//! Builds the CLK for one record: every non-ignored field is validated,
//! tokenized and hashed into the shared bit vector, then the whole
//! filter is XOR-folded. Token positions come from HMAC-based double
//! hashing with per-field keys, following Schnell, Bachteler and
//! Reiher's composite Bloom filter construction.

use blake2::Blake2bMac512;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;

use crate::bloom::{fold_xor, BitVector, EncodingError, InsertionStrategy};
use crate::comparators::TokenIter;
use crate::crypto::KeySet;
use crate::fields::{FieldSpec, InvalidEntry};
use crate::schema::{HashType, Schema};

type HmacSha1 = Hmac<Sha1>;
type HmacMd5 = Hmac<Md5>;

/// One encoded record: the folded filter, the record's position in the
/// input, and the filter's Hamming weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    pub bits: BitVector,
    pub index: usize,
    pub popcount: usize,
}

/// Encode one record into a CLK.
///
/// `keys` must hold a key pair for every field of the schema, ignored
/// fields included. With `validate` off, raw values are handed straight
/// to the comparators.
pub fn encode_record(
    row: &[String],
    index: usize,
    schema: &Schema,
    keys: &KeySet,
    validate: bool,
) -> Result<EncodedRecord, EncodingError> {
    let mut filter = BitVector::zeros(schema.l);

    for (field_index, (spec, value)) in schema.fields.iter().zip(row).enumerate() {
        let FieldSpec::Regular(field) = spec else {
            continue;
        };

        let value: &str = if field.hashing.is_missing_value(value) {
            match field
                .hashing
                .missing_value
                .as_ref()
                .and_then(|missing| missing.replace_with.as_deref())
            {
                Some(replacement) => replacement,
                // No replacement: the field contributes nothing.
                None => continue,
            }
        } else {
            if validate {
                field
                    .format
                    .validate(&field.identifier, value)
                    .map_err(|source| EncodingError::Entry { row_index: index, source })?;
            }
            value.as_str()
        };

        let tokens = field.hashing.comparison.tokenize(value).map_err(|e| {
            EncodingError::Entry {
                row_index: index,
                source: InvalidEntry::new(&field.identifier, e.to_string()),
            }
        })?;

        let (key_a, key_b) = keys.pair(field_index)?;
        match schema.hash_type {
            HashType::DoubleHash { prevent_singularity } => insert_double_hash(
                &mut filter,
                tokens,
                &field.hashing.strategy,
                key_a,
                key_b,
                prevent_singularity,
            )?,
            HashType::BlakeHash => {
                insert_blake(&mut filter, tokens, &field.hashing.strategy, key_a)?
            }
        }
    }

    let folded = fold_xor(filter, schema.xor_folds)?;
    let popcount = folded.count_ones();
    Ok(EncodedRecord {
        bits: folded,
        index,
        popcount,
    })
}

/// Resolve the per-token bit count. `BitsPerFeature` needs the token
/// count up front, so only that path materializes the stream.
fn tokens_with_k(tokens: TokenIter, strategy: &InsertionStrategy) -> (TokenIter, u32) {
    match strategy {
        InsertionStrategy::BitsPerToken(k) => (tokens, *k),
        InsertionStrategy::BitsPerFeature(_) => {
            let collected: Vec<String> = tokens.collect();
            let k = strategy.bits_per_token(collected.len());
            (Box::new(collected.into_iter()), k)
        }
    }
}

fn insert_double_hash(
    filter: &mut BitVector,
    tokens: TokenIter,
    strategy: &InsertionStrategy,
    key_a: &[u8],
    key_b: &[u8],
    prevent_singularity: bool,
) -> Result<(), EncodingError> {
    let l = filter.len() as u64;
    let (tokens, k) = tokens_with_k(tokens, strategy);

    for token in tokens {
        let h1 = hmac_sha1_mod(key_a, token.as_bytes(), l)?;
        let mut h2 = hmac_md5_mod(key_b, token.as_bytes(), l)?;
        // With h2 == 0 every probe would collapse onto h1.
        if prevent_singularity && h2 == 0 {
            h2 = 1;
        }
        for i in 0..u64::from(k) {
            filter.set(((h1 + i * h2) % l) as usize);
        }
    }
    Ok(())
}

/// Single-keyed-hash alternative to double hashing: each token derives
/// enough BLAKE2b MACs (salted with their ordinal) to cut `k` 16-bit
/// indices out of the digests. Requires a power-of-two filter length,
/// which the schema loader enforces.
fn insert_blake(
    filter: &mut BitVector,
    tokens: TokenIter,
    strategy: &InsertionStrategy,
    key: &[u8],
) -> Result<(), EncodingError> {
    let l = filter.len() as u64;
    let (tokens, k) = tokens_with_k(tokens, strategy);
    let k = k as usize;
    if k == 0 {
        return Ok(());
    }

    for token in tokens {
        let num_macs = k.div_ceil(32);
        let mut indices = Vec::with_capacity(num_macs * 32);
        for ordinal in 0..num_macs {
            let salt = ordinal.to_string();
            let mut mac = Blake2bMac512::new_with_salt_and_personal(key, salt.as_bytes(), b"")
                .map_err(|e| EncodingError::Hash(e.to_string()))?;
            mac.update(token.as_bytes());
            let digest = mac.finalize().into_bytes();
            for chunk in digest.chunks_exact(2) {
                indices.push(u64::from(u16::from_le_bytes([chunk[0], chunk[1]])));
            }
        }
        for short in &indices[..k] {
            filter.set((short % l) as usize);
        }
    }
    Ok(())
}

fn hmac_sha1_mod(key: &[u8], data: &[u8], modulus: u64) -> Result<u64, EncodingError> {
    let mut mac =
        HmacSha1::new_from_slice(key).map_err(|e| EncodingError::Hash(e.to_string()))?;
    mac.update(data);
    Ok(digest_mod(&mac.finalize().into_bytes(), modulus))
}

fn hmac_md5_mod(key: &[u8], data: &[u8], modulus: u64) -> Result<u64, EncodingError> {
    let mut mac =
        HmacMd5::new_from_slice(key).map_err(|e| EncodingError::Hash(e.to_string()))?;
    mac.update(data);
    Ok(digest_mod(&mac.finalize().into_bytes(), modulus))
}

/// The digest interpreted as a big-endian integer, reduced mod
/// `modulus` byte by byte.
fn digest_mod(digest: &[u8], modulus: u64) -> u64 {
    digest
        .iter()
        .fold(0u64, |acc, byte| ((acc << 8) | u64::from(*byte)) % modulus)
}
