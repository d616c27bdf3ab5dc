//! Comparison Techniques Module
//!
//! A comparator turns one field value into a lazy sequence of tokens.
//! The tokens are what the Bloom encoder hashes: two values are similar
//! exactly to the degree that their token sets intersect, so each
//! comparator encodes a different notion of similarity:
//! - `Ngram`: sliding character windows, tolerant to spelling errors
//! - `Exact`: the whole value as a single token
//! - `Numeric`: overlapping neighbourhoods of close numbers
//! - `Non`: no tokens at all, for ignored fields

use std::iter;

/// Comparator error types
#[derive(Debug, thiserror::Error)]
pub enum ComparatorError {
    #[error("value {0:?} is not a number")]
    NotANumber(String),

    #[error("invalid comparison parameter: {0}")]
    InvalidParameter(String),
}

/// Lazy token sequence. The Bloom encoder consumes it exactly once.
pub type TokenIter = Box<dyn Iterator<Item = String>>;

/// A tokenization strategy, resolved from its schema tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Sliding `n`-character windows over the value, padded with `n-1`
    /// spaces on each side so every character appears in `n` windows.
    /// With `positional`, tokens carry their 1-based window index, which
    /// suits values where position matters (postcodes, phone numbers).
    Ngram { n: usize, positional: bool },
    /// The whole value as one token: all-or-nothing similarity.
    Exact,
    /// Token neighbourhoods for numbers, see [`NumericComparison`].
    Numeric(NumericComparison),
    /// Emits nothing.
    Non,
}

impl Comparison {
    /// Tokenize `word`. Empty input produces no tokens for every
    /// comparison type.
    pub fn tokenize(&self, word: &str) -> Result<TokenIter, ComparatorError> {
        match self {
            Comparison::Ngram { n, positional } => Ok(tokenize_ngram(word, *n, *positional)),
            Comparison::Exact => {
                if word.is_empty() {
                    Ok(Box::new(iter::empty()))
                } else {
                    Ok(Box::new(iter::once(word.to_string())))
                }
            }
            Comparison::Numeric(numeric) => numeric.tokenize(word),
            Comparison::Non => Ok(Box::new(iter::empty())),
        }
    }
}

/// Produce the n-grams of `word` over characters, not bytes.
///
/// A non-empty word of `m` characters yields `m + n - 1` tokens for
/// `n >= 1`. For `n == 0` a single empty token records only that the
/// field was present.
fn tokenize_ngram(word: &str, n: usize, positional: bool) -> TokenIter {
    let chars: Vec<char> = word.chars().collect();
    if chars.is_empty() {
        return Box::new(iter::empty());
    }
    if n == 0 {
        let token = if positional { "1 ".to_string() } else { String::new() };
        return Box::new(iter::once(token));
    }

    let pad = n - 1;
    let mut padded = Vec::with_capacity(chars.len() + 2 * pad);
    padded.extend(iter::repeat(' ').take(pad));
    padded.extend(chars);
    padded.extend(iter::repeat(' ').take(pad));

    let count = padded.len() - n + 1;
    Box::new((0..count).map(move |i| {
        let gram: String = padded[i..i + n].iter().collect();
        if positional {
            format!("{} {}", i + 1, gram)
        } else {
            gram
        }
    }))
}

/// Numerical comparison of integers and floating point numbers, after
/// Vatsalan and Christen (Privacy-preserving matching of similar
/// patients, Journal of Biomedical Informatics, 2015).
///
/// The neighbourhood of a number is encoded so that the neighbourhoods
/// of close numbers overlap. Inputs are first quantized onto a common
/// grid, otherwise the neighbourhoods of e.g. 25 and 26 would interleave
/// without ever sharing a token. Quantization also means two values just
/// beyond `threshold_distance` can still share one boundary token.
///
/// Instead of spacing the neighbourhood by `threshold_distance / (2 *
/// resolution)`, every value is multiplied by `2 * resolution` and
/// spaced by `threshold_distance` directly, which avoids the division
/// and its precision loss. Floats are scaled by
/// `10^fractional_precision` and rounded to the nearest integer first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericComparison {
    distance_interval: i128,
    resolution: i128,
    fractional_precision: u32,
}

impl NumericComparison {
    /// Build a numeric comparison.
    ///
    /// `threshold_distance` is the largest distance that still produces
    /// a token overlap; `resolution` controls how many tokens are
    /// generated (`2 * resolution + 1` in total); and
    /// `fractional_precision` is the number of digits after the point
    /// that are significant.
    pub fn new(
        threshold_distance: f64,
        resolution: u32,
        fractional_precision: u32,
    ) -> Result<Self, ComparatorError> {
        if !(threshold_distance > 0.0) {
            return Err(ComparatorError::InvalidParameter(format!(
                "threshold_distance has to be positive, but was {threshold_distance}"
            )));
        }
        if resolution < 1 {
            return Err(ComparatorError::InvalidParameter(format!(
                "resolution has to be greater than zero, but was {resolution}"
            )));
        }
        let distance_interval =
            (threshold_distance * 10f64.powi(fractional_precision as i32)).round() as i128;
        if distance_interval == 0 {
            return Err(ComparatorError::InvalidParameter(
                "not enough fractional precision to encode threshold_distance".to_string(),
            ));
        }
        Ok(Self {
            distance_interval,
            resolution: resolution as i128,
            fractional_precision,
        })
    }

    fn parse(&self, word: &str) -> Result<i128, ComparatorError> {
        // Integer parse first, so large integers lose no precision.
        if let Ok(v) = word.parse::<i128>() {
            return Ok(v * 10_i128.pow(self.fractional_precision));
        }
        let v: f64 = word
            .parse()
            .map_err(|_| ComparatorError::NotANumber(word.to_string()))?;
        if self.fractional_precision > 0 {
            Ok((v * 10f64.powi(self.fractional_precision as i32)).round() as i128)
        } else {
            Ok(v.trunc() as i128)
        }
    }

    /// Emit the `2 * resolution + 1` neighbourhood tokens of `word`.
    pub fn tokenize(&self, word: &str) -> Result<TokenIter, ComparatorError> {
        if word.is_empty() {
            return Ok(Box::new(iter::empty()));
        }
        let mut v = self.parse(word)? * 2 * self.resolution;

        // Quantize to the nearest multiple of the interval; the exact
        // midpoint rounds up.
        let residue = v.rem_euclid(self.distance_interval);
        if residue != 0 {
            if residue * 2 < self.distance_interval {
                v -= residue;
            } else {
                v += self.distance_interval - residue;
            }
        }

        let interval = self.distance_interval;
        let resolution = self.resolution;
        Ok(Box::new(
            (-resolution..=resolution).map(move |i| (v + i * interval).to_string()),
        ))
    }
}
