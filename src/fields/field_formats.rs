//! Field Format Validators
//!
//! Each format knows how to validate a raw string value against its
//! constraints and how to canonicalize it. Validation failures are
//! reported as [`InvalidEntry`] carrying the column identifier; the
//! encoder decides whether validation runs at all.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, NaiveDate};

use crate::bloom::InsertionStrategy;
use crate::comparators::Comparison;
use crate::fields::InvalidEntry;

/// Character encoding a string field must fit into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Ascii,
}

/// Case constraint for string fields without a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Upper,
    Lower,
    Mixed,
}

/// Either a full-string pattern or shape constraints, never both.
#[derive(Debug, Clone)]
pub enum StringConstraint {
    /// Anchored match over the whole value.
    Pattern(regex::Regex),
    Shape {
        case: Case,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct StringFormat {
    pub encoding: Encoding,
    pub constraint: StringConstraint,
}

#[derive(Debug, Clone)]
pub struct IntegerFormat {
    pub minimum: Option<i128>,
    pub maximum: Option<i128>,
}

#[derive(Debug, Clone)]
pub struct DateFormat {
    /// strftime-style pattern the raw value must conform to.
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct EnumFormat {
    pub values: HashSet<String>,
}

/// The format of one input column.
#[derive(Debug, Clone)]
pub enum FieldFormat {
    String(StringFormat),
    Integer(IntegerFormat),
    Date(DateFormat),
    Enum(EnumFormat),
    /// Free numeric values; the numeric comparator re-parses them.
    Numeric,
}

impl StringFormat {
    fn validate(&self, identifier: &str, value: &str) -> Result<(), InvalidEntry> {
        if self.encoding == Encoding::Ascii && !value.is_ascii() {
            return Err(InvalidEntry::new(
                identifier,
                format!("string {value:?} is not representable in ascii"),
            ));
        }
        match &self.constraint {
            StringConstraint::Pattern(pattern) => {
                if !pattern.is_match(value) {
                    return Err(InvalidEntry::new(
                        identifier,
                        format!("string {value:?} does not match the pattern"),
                    ));
                }
            }
            StringConstraint::Shape {
                case,
                min_length,
                max_length,
            } => {
                let length = value.chars().count();
                if let Some(min) = min_length {
                    if length < *min {
                        return Err(InvalidEntry::new(
                            identifier,
                            format!(
                                "expected string length of at least {min}, read string of length {length}"
                            ),
                        ));
                    }
                }
                if let Some(max) = max_length {
                    if length > *max {
                        return Err(InvalidEntry::new(
                            identifier,
                            format!(
                                "expected string length of at most {max}, read string of length {length}"
                            ),
                        ));
                    }
                }
                match case {
                    Case::Upper if value.to_uppercase() != value => {
                        return Err(InvalidEntry::new(
                            identifier,
                            format!("expected upper case string, read {value:?}"),
                        ));
                    }
                    Case::Lower if value.to_lowercase() != value => {
                        return Err(InvalidEntry::new(
                            identifier,
                            format!("expected lower case string, read {value:?}"),
                        ));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

impl IntegerFormat {
    fn parse(identifier: &str, value: &str) -> Result<i128, InvalidEntry> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix(['+', '-'])
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidEntry::new(
                identifier,
                format!("expected integer to consist of numerical characters only, read {value:?}"),
            ));
        }
        trimmed.parse::<i128>().map_err(|_| {
            InvalidEntry::new(
                identifier,
                format!("integer {value:?} is out of the representable range"),
            )
        })
    }

    fn validate(&self, identifier: &str, value: &str) -> Result<(), InvalidEntry> {
        let parsed = Self::parse(identifier, value)?;
        if let Some(minimum) = self.minimum {
            if parsed < minimum {
                return Err(InvalidEntry::new(
                    identifier,
                    format!("expected integer value of at least {minimum}, read {parsed}"),
                ));
            }
        }
        if let Some(maximum) = self.maximum {
            if parsed > maximum {
                return Err(InvalidEntry::new(
                    identifier,
                    format!("expected integer value of at most {maximum}, read {parsed}"),
                ));
            }
        }
        Ok(())
    }
}

impl DateFormat {
    /// True if the strftime pattern itself is well formed.
    pub fn pattern_is_valid(pattern: &str) -> bool {
        !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
    }

    fn parse(&self, identifier: &str, value: &str) -> Result<NaiveDate, InvalidEntry> {
        let parsed = NaiveDate::parse_from_str(value, &self.pattern).map_err(|_| {
            InvalidEntry::new(identifier, format!("invalid date, read {value:?}"))
        })?;
        if parsed.year() == 0 {
            return Err(InvalidEntry::new(
                identifier,
                format!("date year must not be zero, read {value:?}"),
            ));
        }
        // The reference patterns are fixed-width; require the value to
        // reproduce exactly so "194-06-14" cannot pass as year 194.
        let mut canonical = String::new();
        write!(
            canonical,
            "{}",
            parsed.format_with_items(StrftimeItems::new(&self.pattern))
        )
        .map_err(|_| InvalidEntry::new(identifier, "date pattern cannot format dates"))?;
        if canonical != value {
            return Err(InvalidEntry::new(
                identifier,
                format!("date {value:?} does not conform to the pattern"),
            ));
        }
        Ok(parsed)
    }

    fn validate(&self, identifier: &str, value: &str) -> Result<(), InvalidEntry> {
        self.parse(identifier, value).map(|_| ())
    }
}

impl EnumFormat {
    fn validate(&self, identifier: &str, value: &str) -> Result<(), InvalidEntry> {
        if self.values.contains(value) {
            Ok(())
        } else {
            Err(InvalidEntry::new(
                identifier,
                format!("{value:?} is not one of the enumerated values"),
            ))
        }
    }
}

impl FieldFormat {
    /// Check `value` against this format's constraints.
    pub fn validate(&self, identifier: &str, value: &str) -> Result<(), InvalidEntry> {
        match self {
            FieldFormat::String(format) => format.validate(identifier, value),
            FieldFormat::Integer(format) => format.validate(identifier, value),
            FieldFormat::Date(format) => format.validate(identifier, value),
            FieldFormat::Enum(format) => format.validate(identifier, value),
            FieldFormat::Numeric => {
                let trimmed = value.trim();
                let is_number = trimmed.parse::<i128>().is_ok()
                    || trimmed.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false);
                if is_number {
                    Ok(())
                } else {
                    Err(InvalidEntry::new(
                        identifier,
                        format!("{value:?} is not a number"),
                    ))
                }
            }
        }
    }

    /// Canonical form of a valid value: integers lose sign and padding,
    /// dates become ISO `YYYY-MM-DD`, everything else is unchanged.
    pub fn format_value(&self, identifier: &str, value: &str) -> Result<String, InvalidEntry> {
        match self {
            FieldFormat::Integer(_) => {
                Ok(IntegerFormat::parse(identifier, value)?.to_string())
            }
            FieldFormat::Date(format) => {
                let parsed = format.parse(identifier, value)?;
                Ok(parsed.format("%Y-%m-%d").to_string())
            }
            FieldFormat::Numeric => Ok(value.trim().to_string()),
            FieldFormat::String(_) | FieldFormat::Enum(_) => Ok(value.to_string()),
        }
    }
}

/// Sentinel handling for absent values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingValue {
    /// The exact input marking the value as missing.
    pub sentinel: String,
    /// Tokenized in place of the sentinel; `None` skips the field.
    pub replace_with: Option<String>,
}

/// How one field's tokens reach the Bloom filter.
#[derive(Debug, Clone)]
pub struct FieldHashingProperties {
    pub comparison: Comparison,
    pub strategy: InsertionStrategy,
    pub missing_value: Option<MissingValue>,
}

impl FieldHashingProperties {
    pub fn is_missing_value(&self, value: &str) -> bool {
        self.missing_value
            .as_ref()
            .is_some_and(|missing| missing.sentinel == value)
    }

    /// The value to tokenize: the replacement if `value` is the
    /// sentinel and a replacement exists, otherwise `value` itself.
    pub fn replace_missing_value<'a>(&'a self, value: &'a str) -> &'a str {
        match &self.missing_value {
            Some(missing) if missing.sentinel == value => {
                missing.replace_with.as_deref().unwrap_or(value)
            }
            _ => value,
        }
    }
}

/// A field that contributes bits to the encoding.
#[derive(Debug, Clone)]
pub struct RegularField {
    pub identifier: String,
    pub description: Option<String>,
    pub format: FieldFormat,
    pub hashing: FieldHashingProperties,
}

/// One input column of the schema.
///
/// Ignored fields keep their position in the row for header checking
/// but are neither validated nor hashed.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    Regular(RegularField),
    Ignored { identifier: String },
}

impl FieldSpec {
    pub fn identifier(&self) -> &str {
        match self {
            FieldSpec::Regular(field) => &field.identifier,
            FieldSpec::Ignored { identifier } => identifier,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, FieldSpec::Ignored { .. })
    }

    /// Validate one value, honoring the missing-value sentinel.
    pub fn validate(&self, value: &str) -> Result<(), InvalidEntry> {
        match self {
            FieldSpec::Ignored { .. } => Ok(()),
            FieldSpec::Regular(field) => {
                if field.hashing.is_missing_value(value) {
                    return Ok(());
                }
                field.format.validate(&field.identifier, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::InsertionStrategy;

    fn hashing() -> FieldHashingProperties {
        FieldHashingProperties {
            comparison: Comparison::Ngram { n: 2, positional: false },
            strategy: InsertionStrategy::BitsPerToken(20),
            missing_value: None,
        }
    }

    fn string_shape(
        case: Case,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> FieldFormat {
        FieldFormat::String(StringFormat {
            encoding: Encoding::Utf8,
            constraint: StringConstraint::Shape { case, min_length, max_length },
        })
    }

    #[test]
    fn test_string_lengths() {
        let format = string_shape(Case::Mixed, Some(5), Some(8));
        assert!(format.validate("f", "").is_err());
        assert!(format.validate("f", "dogs").is_err());
        assert!(format.validate("f", "doggodogs").is_err());
        assert!(format.validate("f", "doggo").is_ok());
        assert!(format.validate("f", "doggos").is_ok());
        assert!(format.validate("f", "doggies!").is_ok());

        // No limits at all.
        let free = string_shape(Case::Mixed, None, None);
        assert!(free.validate("f", "").is_ok());
        assert!(free.validate("f", &"doggo".repeat(10000)).is_ok());
    }

    #[test]
    fn test_string_case() {
        let lower = string_shape(Case::Lower, None, None);
        assert!(lower.validate("f", "hello you").is_ok());
        assert!(lower.validate("f", "Hello You").is_err());

        let upper = string_shape(Case::Upper, None, None);
        assert!(upper.validate("f", "HELLO SHOUTY").is_ok());
        assert!(upper.validate("f", "Hello You").is_err());

        let mixed = string_shape(Case::Mixed, None, None);
        assert!(mixed.validate("f", "Hello This is FINE!").is_ok());
    }

    #[test]
    fn test_string_encoding() {
        let ascii = FieldFormat::String(StringFormat {
            encoding: Encoding::Ascii,
            constraint: StringConstraint::Shape {
                case: Case::Mixed,
                min_length: None,
                max_length: None,
            },
        });
        assert!(ascii.validate("f", "dogs").is_ok());
        assert!(ascii.validate("f", "dogødog").is_err());

        let utf8 = string_shape(Case::Mixed, None, None);
        assert!(utf8.validate("f", "doggøs").is_ok());
        assert!(utf8.validate("f", "fërrets").is_ok());
    }

    #[test]
    fn test_string_pattern() {
        let format = FieldFormat::String(StringFormat {
            encoding: Encoding::Utf8,
            constraint: StringConstraint::Pattern(
                regex::Regex::new(r"\A(?:dog(.dog)*)\z").unwrap(),
            ),
        });
        assert!(format.validate("f", "dog").is_ok());
        assert!(format.validate("f", "dogodog").is_ok());
        assert!(format.validate("f", "dogs").is_err());
        assert!(format.validate("f", "hot dog").is_err());
        assert!(format.validate("f", "hot dogs").is_err());
    }

    #[test]
    fn test_integer_validation() {
        let unbounded = FieldFormat::Integer(IntegerFormat { minimum: None, maximum: None });
        for good in ["-31", "0", "1", "10", "  10", "10  ", "+10", " +10 "] {
            assert!(unbounded.validate("f", good).is_ok(), "{good:?}");
        }
        for bad in ["3.141592", "-3.14", "boom", "", "+", "1e3"] {
            assert!(unbounded.validate("f", bad).is_err(), "{bad:?}");
        }

        let bounded = FieldFormat::Integer(IntegerFormat { minimum: Some(8), maximum: Some(12) });
        for bad in ["-1", "0", "1", "13"] {
            assert!(bounded.validate("f", bad).is_err(), "{bad:?}");
        }
        for good in ["8", "9", "12"] {
            assert!(bounded.validate("f", good).is_ok(), "{good:?}");
        }
    }

    #[test]
    fn test_integer_canonical_form() {
        let format = FieldFormat::Integer(IntegerFormat { minimum: None, maximum: None });
        for raw in ["  10", "10  ", "+10", " +10 "] {
            assert_eq!(format.format_value("f", raw).unwrap(), "10");
        }
        assert!(format.format_value("f", "boom").is_err());
    }

    #[test]
    fn test_date_validation() {
        let format = FieldFormat::Date(DateFormat { pattern: "%Y-%m-%d".to_string() });
        for good in [
            "1946-06-14",
            "1977-12-31",
            "2006-03-20",
            "2017-02-28",
            "2016-02-29",
            "2000-02-29",
        ] {
            assert!(format.validate("f", good).is_ok(), "{good:?}");
        }
        for bad in [
            "0000-03-20",
            "2006-00-20",
            "2006-13-20",
            "2006-03-00",
            "2006-03-52",
            "194-06-14",
            "1946--06-14",
            "194606-14",
            "1946-0614",
            "2006-3-20d",
            "d2006-3-20",
            "",
            "asdfghjkl",
            "20-03-2006",
            "2017-11-31",
            "2017-02-29",
            "2016-02-30",
            "1900-02-29",
        ] {
            assert!(format.validate("f", bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_date_canonical_form() {
        let format = FieldFormat::Date(DateFormat { pattern: "%d/%m/%Y".to_string() });
        assert!(format.validate("f", "14/06/1946").is_ok());
        assert_eq!(format.format_value("f", "14/06/1946").unwrap(), "1946-06-14");
        assert!(format.validate("f", "1946-06-14").is_err());
    }

    #[test]
    fn test_date_pattern_check() {
        assert!(DateFormat::pattern_is_valid("%Y-%m-%d"));
        assert!(!DateFormat::pattern_is_valid("invalid%"));
    }

    #[test]
    fn test_enum_membership() {
        let format = FieldFormat::Enum(EnumFormat {
            values: ["M", "F"].iter().map(|s| s.to_string()).collect(),
        });
        assert!(format.validate("gender", "M").is_ok());
        assert!(format.validate("gender", "F").is_ok());
        assert!(format.validate("gender", "X").is_err());
        assert!(format.validate("gender", "").is_err());
    }

    #[test]
    fn test_numeric_format() {
        let format = FieldFormat::Numeric;
        for good in ["42", "-17", "3.14", " 2.5 ", "1e3"] {
            assert!(format.validate("f", good).is_ok(), "{good:?}");
        }
        for bad in ["boom", "", "NaN", "inf"] {
            assert!(format.validate("f", bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_missing_value_replacement() {
        let mut properties = hashing();
        properties.missing_value = Some(MissingValue {
            sentinel: "null".to_string(),
            replace_with: Some("cat".to_string()),
        });
        assert!(properties.is_missing_value("null"));
        assert!(!properties.is_missing_value("dog"));
        assert_eq!(properties.replace_missing_value("null"), "cat");
        assert_eq!(properties.replace_missing_value("dog"), "dog");

        properties.missing_value = Some(MissingValue {
            sentinel: "null".to_string(),
            replace_with: None,
        });
        assert_eq!(properties.replace_missing_value("null"), "null");
    }

    #[test]
    fn test_sentinel_bypasses_validation() {
        let field = FieldSpec::Regular(RegularField {
            identifier: "age".to_string(),
            description: None,
            format: FieldFormat::Integer(IntegerFormat { minimum: Some(0), maximum: None }),
            hashing: FieldHashingProperties {
                comparison: Comparison::Ngram { n: 1, positional: true },
                strategy: InsertionStrategy::BitsPerToken(20),
                missing_value: Some(MissingValue {
                    sentinel: "N/A".to_string(),
                    replace_with: None,
                }),
            },
        });
        assert!(field.validate("N/A").is_ok());
        assert!(field.validate("27").is_ok());
        assert!(field.validate("boom").is_err());
    }

    #[test]
    fn test_ignored_field_validates_everything() {
        let field = FieldSpec::Ignored { identifier: "INDEX".to_string() };
        assert!(field.validate("anything at all").is_ok());
        assert!(field.is_ignored());
        assert_eq!(field.identifier(), "INDEX");
    }
}
