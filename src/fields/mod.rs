//! Field Specification Module
//!
//! Per-column specifications: the value format with its validation
//! rules, the hashing properties (comparator, insertion strategy,
//! missing-value policy), and the ignored-field case.

pub mod field_formats;

// Re-export main types
pub use field_formats::{
    Case, Encoding, EnumFormat, FieldFormat, FieldHashingProperties, FieldSpec, IntegerFormat,
    DateFormat, MissingValue, RegularField, StringConstraint, StringFormat,
};

/// A single field value failed its validator.
///
/// The pipeline wraps this with the row index before surfacing it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid entry in column '{field}': {reason}")]
pub struct InvalidEntry {
    pub field: String,
    pub reason: String,
}

impl InvalidEntry {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
