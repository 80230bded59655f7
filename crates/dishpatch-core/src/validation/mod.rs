//! Input validation and normalization.
//!
//! Validate all external inputs before any store access.

use thiserror::Error;

use crate::secrets::Password;

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// One or more required fields were absent, null, or empty.
    #[error("missing required fields: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// Input exceeds maximum allowed length.
    #[error("{field} exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// The identifier is not a plausible email address.
    #[error("invalid email address")]
    InvalidIdentifier,

    /// The request body could not be understood.
    #[error("malformed request: {0}")]
    Malformed(String),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum identifier (email) length.
    pub const MAX_IDENTIFIER_LENGTH: usize = 254;

    /// Maximum password length. Bounds hashing work per request.
    pub const MAX_PASSWORD_LENGTH: usize = 1024;

    /// Maximum length of free-text profile fields.
    pub const MAX_TEXT_LENGTH: usize = 256;
}

/// Normalize a contact identifier: trimmed and lower-cased.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Check that a normalized identifier looks like an email address.
///
/// # Errors
///
/// Returns `ValidationError::InvalidIdentifier` or `ValidationError::TooLong`.
pub fn validate_identifier(identifier: &str) -> Result<(), ValidationError> {
    check_length("email", identifier, limits::MAX_IDENTIFIER_LENGTH)?;

    let mut parts = identifier.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ValidationError::InvalidIdentifier);
    };

    if local.is_empty() || domain.is_empty() || identifier.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidIdentifier);
    }

    Ok(())
}

/// Reject values longer than `max` bytes.
///
/// # Errors
///
/// Returns `ValidationError::TooLong` if `value` exceeds `max`.
pub fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field,
            max,
            actual: value.len(),
        });
    }
    Ok(())
}

/// Collects required fields and reports every missing one at once.
///
/// Absent, `null`, empty, and whitespace-only values are all "missing".
/// Values taken from a failed collector must not be used: `finish` is the gate.
#[derive(Debug, Default)]
pub struct RequiredFields {
    missing: Vec<&'static str>,
}

impl RequiredFields {
    /// Start a new collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a required text field, trimmed.
    pub fn text(&mut self, field: &'static str, value: Option<String>) -> String {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => v,
            _ => {
                self.missing.push(field);
                String::new()
            }
        }
    }

    /// Take a required secret field. The secret itself is never trimmed.
    pub fn secret(&mut self, field: &'static str, value: Option<Password>) -> Password {
        match value {
            Some(v) if !v.is_blank() => v,
            _ => {
                self.missing.push(field);
                Password::new(String::new())
            }
        }
    }

    /// Finish collection.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Missing` naming every missing field.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Missing(self.missing))
        }
    }
}

/// Trim an optional text field, mapping blank values to `None`.
#[must_use]
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
