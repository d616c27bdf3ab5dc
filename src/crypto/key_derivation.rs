//! Key Derivation Implementation
//!
//! Expands master secrets into independent per-field HMAC keys using
//! HKDF as described in RFC 5869. Each party derives the same key
//! material from the shared secrets, the schema's salt/info and the
//! number of fields, so the resulting encodings are comparable.

use hkdf::Hkdf;
use sha2::{Sha256, Sha512};

use crate::crypto::{CryptoError, CryptoResult};

/// The block size of SHA1 and MD5, used as the default HMAC key size.
pub const DEFAULT_KEY_SIZE: usize = 64;

/// Hash function driving the HKDF extract/expand phases.
///
/// The choice of hash bounds the output key material: HKDF can produce
/// at most `255 * digest_size` bytes per master secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Resolve an algorithm from its schema tag.
    pub fn from_name(name: &str) -> CryptoResult<Self> {
        match name {
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA512" => Ok(HashAlgorithm::Sha512),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Key derivation function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kdf {
    /// HKDF per RFC 5869. The only sound choice.
    Hkdf,
    /// Hands the raw master secrets to every field. Identical n-grams in
    /// different fields map to the same bit positions, which leaks
    /// structure. Kept only to reproduce historical encodings.
    Legacy,
}

impl Kdf {
    /// Resolve a KDF from its schema tag.
    pub fn from_name(name: &str) -> CryptoResult<Self> {
        match name {
            "HKDF" => Ok(Kdf::Hkdf),
            "legacy" => Ok(Kdf::Legacy),
            other => Err(CryptoError::UnsupportedKdf(other.to_string())),
        }
    }
}

/// Parameters for the key derivation step.
///
/// `salt` is non-secret and strengthens extraction; `info` binds the
/// derived keys to application context. Both are optional in RFC 5869.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfConfig {
    pub kdf: Kdf,
    pub hash: HashAlgorithm,
    pub salt: Option<Vec<u8>>,
    pub info: Option<Vec<u8>>,
    /// Size of each derived key in bytes.
    pub key_size: usize,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            kdf: Kdf::Hkdf,
            hash: HashAlgorithm::Sha256,
            salt: None,
            info: None,
            key_size: DEFAULT_KEY_SIZE,
        }
    }
}

/// Derived key material, indexed by field and then by master secret.
///
/// `keys[f][i]` holds the `f`-th key derived from the `i`-th master
/// secret. The double-hash encoder uses exactly two secrets and reads
/// the per-field pair through [`KeySet::pair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<Vec<Vec<u8>>>,
}

impl KeySet {
    /// Number of fields this key set covers.
    pub fn num_fields(&self) -> usize {
        self.keys.len()
    }

    /// All keys derived for one field, one per master secret.
    pub fn keys_for_field(&self, field: usize) -> CryptoResult<&[Vec<u8>]> {
        self.keys
            .get(field)
            .map(Vec::as_slice)
            .ok_or(CryptoError::MissingFieldKeys(field))
    }

    /// The `(key_a, key_b)` HMAC keys for a field.
    ///
    /// Fails unless the set was derived from exactly two master secrets.
    pub fn pair(&self, field: usize) -> CryptoResult<(&[u8], &[u8])> {
        let keys = self.keys_for_field(field)?;
        match keys {
            [a, b] => Ok((a.as_slice(), b.as_slice())),
            other => Err(CryptoError::KeyCount(other.len())),
        }
    }
}

/// Expand one master secret into `num_keys` keys of `key_size` bytes.
fn hkdf_expand(master_secret: &[u8], num_keys: usize, config: &KdfConfig) -> CryptoResult<Vec<Vec<u8>>> {
    let mut okm = vec![0u8; num_keys * config.key_size];
    let salt = config.salt.as_deref();
    let info = config.info.as_deref().unwrap_or(&[]);

    match config.hash {
        HashAlgorithm::Sha256 => Hkdf::<Sha256>::new(salt, master_secret)
            .expand(info, &mut okm)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?,
        HashAlgorithm::Sha512 => Hkdf::<Sha512>::new(salt, master_secret)
            .expand(info, &mut okm)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?,
    }

    Ok(okm.chunks(config.key_size).map(|chunk| chunk.to_vec()).collect())
}

/// Derive a key for every field from every master secret.
///
/// Runs HKDF once per secret to produce `num_fields * key_size` bytes,
/// splits the stream into consecutive keys and transposes, so that
/// `keys[f][i]` is the `f`-th key of the `i`-th secret.
///
/// With `Kdf::Legacy` the raw secrets are returned for every field
/// instead, and a warning is logged.
pub fn derive_key_lists<S: AsRef<[u8]>>(
    master_secrets: &[S],
    num_fields: usize,
    config: &KdfConfig,
) -> CryptoResult<KeySet> {
    if config.kdf == Kdf::Legacy {
        log::warn!(
            "legacy key derivation maps identical tokens in different fields \
             to the same bit positions; use HKDF unless reproducing old encodings"
        );
        let row: Vec<Vec<u8>> = master_secrets.iter().map(|s| s.as_ref().to_vec()).collect();
        return Ok(KeySet {
            keys: vec![row; num_fields],
        });
    }

    if config.key_size == 0 {
        return Err(CryptoError::KeyDerivationFailed(
            "key size must be non-zero".to_string(),
        ));
    }

    // One key list per secret, then transpose to per-field pairs.
    let mut per_secret = Vec::with_capacity(master_secrets.len());
    for secret in master_secrets {
        per_secret.push(hkdf_expand(secret.as_ref(), num_fields, config)?);
    }

    let mut keys = Vec::with_capacity(num_fields);
    for field in 0..num_fields {
        keys.push(
            per_secret
                .iter()
                .map(|list| list[field].clone())
                .collect::<Vec<_>>(),
        );
    }

    Ok(KeySet { keys })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc5869_case_1() {
        // Test case 1 from RFC 5869, appendix A.
        let ikm = [0x0b_u8; 22];
        let config = KdfConfig {
            salt: Some(hex::decode("000102030405060708090a0b0c").unwrap()),
            info: Some(hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap()),
            key_size: 42,
            ..KdfConfig::default()
        };
        let keys = derive_key_lists(&[&ikm[..]], 1, &config).unwrap();
        assert_eq!(
            keys.keys_for_field(0).unwrap()[0],
            hex::decode(
                "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_key_counts_and_sizes() {
        let secret = b"No, I am your father";
        for num_fields in [1usize, 10, 50] {
            for key_size in [2usize, 20, 64] {
                let config = KdfConfig {
                    key_size,
                    ..KdfConfig::default()
                };
                let keys = derive_key_lists(&[secret], num_fields, &config).unwrap();
                assert_eq!(keys.num_fields(), num_fields);
                for field in 0..num_fields {
                    let list = keys.keys_for_field(field).unwrap();
                    assert_eq!(list.len(), 1);
                    assert_eq!(list[0].len(), key_size);
                }
            }
        }
    }

    #[test]
    fn test_pair_per_field() {
        let secrets: [&[u8]; 2] = [b"secret", b"sshh"];
        let keys = derive_key_lists(&secrets, 4, &KdfConfig::default()).unwrap();
        for field in 0..4 {
            let (a, b) = keys.pair(field).unwrap();
            assert_eq!(a.len(), DEFAULT_KEY_SIZE);
            assert_eq!(b.len(), DEFAULT_KEY_SIZE);
            assert_ne!(a, b);
        }
        // Keys differ across fields.
        let (a0, _) = keys.pair(0).unwrap();
        let (a1, _) = keys.pair(1).unwrap();
        assert_ne!(a0, a1);
    }

    #[test]
    fn test_pair_requires_two_secrets() {
        let keys = derive_key_lists(&[b"only one"], 2, &KdfConfig::default()).unwrap();
        assert!(matches!(keys.pair(0), Err(CryptoError::KeyCount(1))));
        assert!(matches!(
            keys.pair(7),
            Err(CryptoError::MissingFieldKeys(7))
        ));
    }

    #[test]
    fn test_different_salts_different_keys() {
        let secret: [&[u8]; 1] = [b"No, I am your father"];
        let with_salt = |salt: &[u8]| KdfConfig {
            salt: Some(salt.to_vec()),
            ..KdfConfig::default()
        };
        let keys_1 = derive_key_lists(&secret, 5, &with_salt(b"and pepper")).unwrap();
        let keys_2 = derive_key_lists(&secret, 5, &with_salt(b"and vinegar")).unwrap();
        for field in 0..5 {
            assert_ne!(
                keys_1.keys_for_field(field).unwrap(),
                keys_2.keys_for_field(field).unwrap()
            );
        }
    }

    #[test]
    fn test_sha512_differs_from_sha256() {
        let secret: [&[u8]; 1] = [b"master"];
        let sha512 = KdfConfig {
            hash: HashAlgorithm::Sha512,
            ..KdfConfig::default()
        };
        let keys_256 = derive_key_lists(&secret, 3, &KdfConfig::default()).unwrap();
        let keys_512 = derive_key_lists(&secret, 3, &sha512).unwrap();
        assert_ne!(keys_256, keys_512);
    }

    #[test]
    fn test_legacy_repeats_secrets() {
        let secrets: [&[u8]; 2] = [b"one", b"two"];
        let config = KdfConfig {
            kdf: Kdf::Legacy,
            ..KdfConfig::default()
        };
        let keys = derive_key_lists(&secrets, 3, &config).unwrap();
        for field in 0..3 {
            let (a, b) = keys.pair(field).unwrap();
            assert_eq!(a, b"one");
            assert_eq!(b, b"two");
        }
    }

    #[test]
    fn test_unknown_tags() {
        assert!(matches!(
            HashAlgorithm::from_name("SHA0815"),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            Kdf::from_name("breakMe"),
            Err(CryptoError::UnsupportedKdf(_))
        ));
    }
}
