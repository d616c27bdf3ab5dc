//! Schema Model & Loader
//!
//! Parses the JSON linkage schema shared by both parties, validates it,
//! and resolves comparator, strategy, hash and KDF tags into their
//! concrete implementations. The resulting `Schema` is immutable and is
//! the single source of truth for every encoding run.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::bloom::InsertionStrategy;
use crate::comparators::{Comparison, NumericComparison};
use crate::crypto::{HashAlgorithm, Kdf, KdfConfig, DEFAULT_KEY_SIZE};
use crate::fields::{
    Case, DateFormat, Encoding, EnumFormat, FieldFormat, FieldHashingProperties, FieldSpec,
    IntegerFormat, MissingValue, RegularField, StringConstraint, StringFormat,
};

/// Schema versions this loader understands.
pub const SUPPORTED_VERSIONS: &[u64] = &[1];

/// Schema error types
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema document is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version {0} is not supported")]
    UnsupportedVersion(u64),

    #[error("invalid schema: {0}")]
    Invalid(String),
}

/// How token positions are derived from the per-field keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// HMAC-SHA1 and HMAC-MD5 combined as `h1 + i*h2 mod l`.
    DoubleHash { prevent_singularity: bool },
    /// Keyed BLAKE2b producing 16-bit indices; needs a power-of-two `l`.
    BlakeHash,
}

/// The parsed, validated linkage schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: u64,
    /// Filter length in bits before folding.
    pub l: usize,
    pub xor_folds: u32,
    pub hash_type: HashType,
    pub kdf: KdfConfig,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_slice(bytes)?;
        Self::from_document(document)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        Self::from_json_bytes(json.as_bytes())
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_value(value)?;
        Self::from_document(document)
    }

    /// Bits per emitted vector, after folding.
    pub fn output_bits(&self) -> usize {
        self.l >> self.xor_folds
    }

    pub fn field_identifiers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldSpec::identifier)
    }

    fn from_document(document: SchemaDocument) -> Result<Self, SchemaError> {
        if !SUPPORTED_VERSIONS.contains(&document.version) {
            return Err(SchemaError::UnsupportedVersion(document.version));
        }
        let config = document.clk_config;

        let l = config.l;
        if l < 64 || l % 8 != 0 {
            return Err(SchemaError::Invalid(format!(
                "filter length must be a multiple of 8 and at least 64, got {l}"
            )));
        }

        let xor_folds = config.xor_folds;
        if xor_folds >= 32 || l % (1usize << xor_folds) != 0 || (l >> xor_folds) % 8 != 0 {
            return Err(SchemaError::Invalid(format!(
                "filter length {l} cannot be folded {xor_folds} times"
            )));
        }

        let hash_type = resolve_hash(config.hash.as_ref())?;
        if hash_type == HashType::BlakeHash && !l.is_power_of_two() {
            return Err(SchemaError::Invalid(format!(
                "blakeHash requires a power-of-two filter length, got {l}"
            )));
        }

        let kdf = resolve_kdf(&config.kdf)?;

        let mut identifiers = HashSet::new();
        let mut fields = Vec::with_capacity(document.features.len());
        for feature in document.features {
            if !identifiers.insert(feature.identifier.clone()) {
                return Err(SchemaError::Invalid(format!(
                    "duplicate feature identifier '{}'",
                    feature.identifier
                )));
            }
            fields.push(resolve_feature(feature, config.k)?);
        }

        Ok(Schema {
            version: document.version,
            l,
            xor_folds,
            hash_type,
            kdf,
            fields,
        })
    }
}

// --- JSON document shape -------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    version: u64,
    #[serde(rename = "clkConfig")]
    clk_config: ClkConfigJson,
    features: Vec<FeatureJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ClkConfigJson {
    l: usize,
    /// Global default bits-per-token, used by features without their
    /// own strategy.
    #[serde(default)]
    k: Option<u32>,
    kdf: KdfJson,
    #[serde(default)]
    hash: Option<HashJson>,
    #[serde(default)]
    xor_folds: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct KdfJson {
    #[serde(rename = "type")]
    kdf_type: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    salt: Option<String>,
    #[serde(default)]
    info: Option<String>,
    #[serde(default)]
    key_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HashJson {
    #[serde(rename = "type")]
    hash_type: String,
    #[serde(default)]
    prevent_singularity: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeatureJson {
    identifier: String,
    #[serde(default)]
    ignored: bool,
    #[serde(default)]
    format: Option<FormatJson>,
    #[serde(default)]
    hashing: Option<HashingJson>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum FormatJson {
    #[serde(rename = "string", rename_all = "camelCase")]
    String {
        #[serde(default)]
        encoding: Option<String>,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        case: Option<String>,
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "integer")]
    Integer {
        #[serde(default)]
        minimum: Option<i64>,
        #[serde(default)]
        maximum: Option<i64>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "date")]
    Date {
        format: String,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "enum")]
    Enum {
        values: Vec<String>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "numeric")]
    Numeric {
        #[serde(default)]
        description: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HashingJson {
    /// Comparator and strategy stay untyped here so unknown tags can be
    /// reported as invalid-schema errors rather than parse errors.
    comparison: serde_json::Value,
    #[serde(default)]
    strategy: Option<serde_json::Value>,
    #[serde(default)]
    missing_value: Option<MissingValueJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MissingValueJson {
    sentinel: String,
    #[serde(default)]
    replace_with: Option<String>,
}

// --- tag resolution ------------------------------------------------------

fn resolve_hash(hash: Option<&HashJson>) -> Result<HashType, SchemaError> {
    let Some(hash) = hash else {
        return Ok(HashType::DoubleHash { prevent_singularity: true });
    };
    match hash.hash_type.as_str() {
        "doubleHash" => Ok(HashType::DoubleHash {
            prevent_singularity: hash.prevent_singularity.unwrap_or(true),
        }),
        "blakeHash" => Ok(HashType::BlakeHash),
        other => Err(SchemaError::Invalid(format!(
            "unsupported hash type: '{other}'"
        ))),
    }
}

fn resolve_kdf(kdf: &KdfJson) -> Result<KdfConfig, SchemaError> {
    let decode = |tag: &str, value: &Option<String>| -> Result<Option<Vec<u8>>, SchemaError> {
        value
            .as_ref()
            .map(|encoded| {
                BASE64.decode(encoded).map_err(|e| {
                    SchemaError::Invalid(format!("kdf {tag} is not valid base64: {e}"))
                })
            })
            .transpose()
    };

    let key_size = kdf.key_size.unwrap_or(DEFAULT_KEY_SIZE);
    if key_size == 0 {
        return Err(SchemaError::Invalid("kdf key size must be non-zero".into()));
    }

    Ok(KdfConfig {
        kdf: Kdf::from_name(&kdf.kdf_type).map_err(|e| SchemaError::Invalid(e.to_string()))?,
        hash: kdf
            .hash
            .as_deref()
            .map(HashAlgorithm::from_name)
            .transpose()
            .map_err(|e| SchemaError::Invalid(e.to_string()))?
            .unwrap_or(HashAlgorithm::Sha256),
        salt: decode("salt", &kdf.salt)?,
        info: decode("info", &kdf.info)?,
        key_size,
    })
}

fn resolve_comparison(value: &serde_json::Value) -> Result<Comparison, SchemaError> {
    let tag = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| SchemaError::Invalid("comparison is missing its type tag".into()))?;
    match tag {
        "ngram" => {
            let n = value
                .get("n")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| {
                    SchemaError::Invalid("ngram comparison requires an integer `n`".into())
                })?;
            if n < 0 {
                return Err(SchemaError::Invalid(
                    "`n` in `n`-gram must be non-negative".into(),
                ));
            }
            let positional = value
                .get("positional")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            Ok(Comparison::Ngram { n: n as usize, positional })
        }
        "exact" => Ok(Comparison::Exact),
        "numeric" => {
            let threshold_distance = value
                .get("thresholdDistance")
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| {
                    SchemaError::Invalid(
                        "numeric comparison requires `thresholdDistance`".into(),
                    )
                })?;
            let resolution = value
                .get("resolution")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| {
                    SchemaError::Invalid("numeric comparison requires `resolution`".into())
                })?;
            let fractional_precision = value
                .get("fractional_precision")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            NumericComparison::new(
                threshold_distance,
                resolution as u32,
                fractional_precision as u32,
            )
            .map(Comparison::Numeric)
            .map_err(|e| SchemaError::Invalid(e.to_string()))
        }
        other => Err(SchemaError::Invalid(format!(
            "unsupported comparison strategy: '{other}'"
        ))),
    }
}

fn resolve_strategy(
    value: Option<&serde_json::Value>,
    default_k: Option<u32>,
) -> Result<InsertionStrategy, SchemaError> {
    let Some(value) = value else {
        return default_k.map(InsertionStrategy::BitsPerToken).ok_or_else(|| {
            SchemaError::Invalid(
                "feature defines no insertion strategy and the schema has no default k".into(),
            )
        });
    };
    let object = value.as_object().ok_or_else(|| {
        SchemaError::Invalid("insertion strategy must be an object".into())
    })?;
    let bits_per_token = object.get("bitsPerToken").and_then(serde_json::Value::as_u64);
    let bits_per_feature = object.get("bitsPerFeature").and_then(serde_json::Value::as_u64);
    match (bits_per_token, bits_per_feature) {
        (Some(k), None) => Ok(InsertionStrategy::BitsPerToken(k as u32)),
        (None, Some(budget)) => Ok(InsertionStrategy::BitsPerFeature(budget as u32)),
        (Some(_), Some(_)) => Err(SchemaError::Invalid(
            "insertion strategy must not define both bitsPerToken and bitsPerFeature".into(),
        )),
        (None, None) => {
            let tags: Vec<&str> = object.keys().map(String::as_str).collect();
            Err(SchemaError::Invalid(format!(
                "unsupported insertion strategy: {tags:?}"
            )))
        }
    }
}

fn resolve_format(format: FormatJson) -> Result<FieldFormat, SchemaError> {
    match format {
        FormatJson::String {
            encoding,
            pattern,
            case,
            min_length,
            max_length,
            ..
        } => {
            let encoding = match encoding.as_deref() {
                None | Some("utf-8") => Encoding::Utf8,
                Some("ascii") => Encoding::Ascii,
                Some(other) => {
                    return Err(SchemaError::Invalid(format!(
                        "unsupported string encoding: '{other}'"
                    )));
                }
            };
            let constraint = if let Some(pattern) = pattern {
                // Anchor so the whole value has to match.
                let anchored = format!(r"\A(?:{pattern})\z");
                let compiled = regex::Regex::new(&anchored).map_err(|e| {
                    SchemaError::Invalid(format!("invalid pattern '{pattern}': {e}"))
                })?;
                StringConstraint::Pattern(compiled)
            } else {
                let case = match case.as_deref() {
                    Some("upper") => Case::Upper,
                    Some("lower") => Case::Lower,
                    None | Some("mixed") => Case::Mixed,
                    Some(other) => {
                        return Err(SchemaError::Invalid(format!(
                            "invalid case property '{other}'"
                        )));
                    }
                };
                StringConstraint::Shape { case, min_length, max_length }
            };
            Ok(FieldFormat::String(StringFormat { encoding, constraint }))
        }
        FormatJson::Integer { minimum, maximum, .. } => Ok(FieldFormat::Integer(IntegerFormat {
            minimum: minimum.map(i128::from),
            maximum: maximum.map(i128::from),
        })),
        FormatJson::Date { format, .. } => {
            if !DateFormat::pattern_is_valid(&format) {
                return Err(SchemaError::Invalid(format!(
                    "invalid date pattern '{format}'"
                )));
            }
            Ok(FieldFormat::Date(DateFormat { pattern: format }))
        }
        FormatJson::Enum { values, .. } => Ok(FieldFormat::Enum(EnumFormat {
            values: values.into_iter().collect(),
        })),
        FormatJson::Numeric { .. } => Ok(FieldFormat::Numeric),
    }
}

fn resolve_feature(feature: FeatureJson, default_k: Option<u32>) -> Result<FieldSpec, SchemaError> {
    if feature.ignored {
        return Ok(FieldSpec::Ignored { identifier: feature.identifier });
    }
    let identifier = feature.identifier;
    let description = match &feature.format {
        Some(
            FormatJson::String { description, .. }
            | FormatJson::Integer { description, .. }
            | FormatJson::Date { description, .. }
            | FormatJson::Enum { description, .. }
            | FormatJson::Numeric { description },
        ) => description.clone(),
        None => None,
    };
    let format = feature.format.ok_or_else(|| {
        SchemaError::Invalid(format!("feature '{identifier}' is missing its format"))
    })?;
    let hashing = feature.hashing.ok_or_else(|| {
        SchemaError::Invalid(format!("feature '{identifier}' is missing its hashing block"))
    })?;

    Ok(FieldSpec::Regular(RegularField {
        identifier,
        description,
        format: resolve_format(format)?,
        hashing: FieldHashingProperties {
            comparison: resolve_comparison(&hashing.comparison)?,
            strategy: resolve_strategy(hashing.strategy.as_ref(), default_k)?,
            missing_value: hashing.missing_value.map(|missing| MissingValue {
                sentinel: missing.sentinel,
                replace_with: missing.replace_with,
            }),
        },
    }))
}
