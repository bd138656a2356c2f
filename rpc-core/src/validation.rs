//! Input Validation Framework
//!
//! Field-level error reporting shared by the schema parser and by typed
//! validation (`Validate` on handler input types), plus the checks the
//! builder and dispatcher apply to names and payload sizes.
//!
//! # Example
//!
//! ```rust,ignore
//! use rpc_core::validation::{Validate, ValidationResult, ValidationRules};
//!
//! struct CreateUserInput {
//!     name: String,
//!     email: String,
//!     age: i64,
//! }
//!
//! impl Validate for CreateUserInput {
//!     fn validate(&self) -> ValidationResult {
//!         ValidationRules::new()
//!             .required("name", &self.name)
//!             .min_length("name", &self.name, 2)
//!             .email("email", &self.email)
//!             .range("age", self.age, 0, 150)
//!             .build()
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::RpcConfig;
use crate::error::RpcError;

/// Validation error for a single field.
///
/// `field` is a path into the input: `firstName`, `address.city`, `tags[1]`.
/// An empty path refers to the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path of the field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Error code identifying the type of validation failure
    pub code: String,
}

/// Name used in messages for the whole value.
fn display_name(field: &str) -> &str {
    if field.is_empty() { "value" } else { field }
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }

    /// Build the message from the field's display name.
    fn described(
        field: impl Into<String>,
        code: &str,
        describe: impl FnOnce(&str) -> String,
    ) -> Self {
        let field = field.into();
        let message = describe(display_name(&field));
        Self::new(field, message, code)
    }

    /// `code: "required"`
    pub fn required(field: impl Into<String>) -> Self {
        Self::described(field, "required", |name| format!("{name} is required"))
    }

    /// `code: "invalid_type"`, naming the expected and received JSON types.
    pub fn invalid_type(field: impl Into<String>, expected: &str, received: &str) -> Self {
        Self::described(field, "invalid_type", |name| {
            format!("{name} must be of type {expected}, received {received}")
        })
    }

    /// String shorter than `min` characters.
    pub fn min_length(field: impl Into<String>, min: usize) -> Self {
        Self::described(field, "min_length", |name| {
            format!("{name} must be at least {min} characters")
        })
    }

    /// String longer than `max` characters.
    pub fn max_length(field: impl Into<String>, max: usize) -> Self {
        Self::described(field, "max_length", |name| {
            format!("{name} must be at most {max} characters")
        })
    }

    pub fn min_items(field: impl Into<String>, min: usize) -> Self {
        Self::described(field, "min_items", |name| {
            format!("{name} must contain at least {min} items")
        })
    }

    pub fn max_items(field: impl Into<String>, max: usize) -> Self {
        Self::described(field, "max_items", |name| {
            format!("{name} must contain at most {max} items")
        })
    }

    pub fn minimum(field: impl Into<String>, min: f64) -> Self {
        Self::described(field, "minimum", |name| {
            format!("{name} must be greater than or equal to {min}")
        })
    }

    pub fn maximum(field: impl Into<String>, max: f64) -> Self {
        Self::described(field, "maximum", |name| {
            format!("{name} must be less than or equal to {max}")
        })
    }

    /// Integer outside `min..=max`.
    pub fn range(field: impl Into<String>, min: i64, max: i64) -> Self {
        Self::described(field, "range", |name| format!("{name} must be between {min} and {max}"))
    }

    pub fn pattern(field: impl Into<String>, pattern: &str) -> Self {
        Self::described(field, "pattern", |name| format!("{name} must match pattern: {pattern}"))
    }

    pub fn email(field: impl Into<String>) -> Self {
        Self::described(field, "email", |name| format!("{name} must be a valid email address"))
    }

    /// Value not among `allowed`; the message lists them as JSON.
    pub fn not_in_enum(field: impl Into<String>, allowed: &[Value]) -> Self {
        let allowed = allowed
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Self::described(field, "enum", |name| format!("{name} must be one of: {allowed}"))
    }

    /// `code: "custom"` with a caller-supplied message.
    pub fn custom(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, "custom")
    }
}

/// Result of validating an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Empty when `valid`.
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Valid exactly when `errors` is empty.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if !errors.is_empty() {
            let field_names: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            debug!(error_count = errors.len(), fields = ?field_names, "Validation failed");
        }
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Convert into a `BAD_REQUEST` error when invalid.
    pub fn into_result(self) -> Result<(), RpcError> {
        if self.valid {
            Ok(())
        } else {
            Err(RpcError::validation(self.errors))
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Trait for validatable input types.
///
/// Handlers registered with `query_validated` / `mutation_validated` run
/// this after deserialization and before the handler body.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

impl Validate for () {
    fn validate(&self) -> ValidationResult {
        ValidationResult::ok()
    }
}

impl Validate for Value {
    fn validate(&self) -> ValidationResult {
        ValidationResult::ok()
    }
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> ValidationResult {
        match self {
            Some(value) => value.validate(),
            None => ValidationResult::ok(),
        }
    }
}

/// Builder for validation rules.
///
/// Lengths are counted in characters, not bytes.
#[derive(Debug, Default)]
pub struct ValidationRules {
    errors: Vec<FieldError>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank after trimming fails with `required`.
    #[must_use]
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            trace!(field = %field, "Required field is empty");
            self.errors.push(FieldError::required(field));
        }
        self
    }

    #[must_use]
    pub fn min_length(mut self, field: &str, value: &str, min: usize) -> Self {
        if value.chars().count() < min {
            self.errors.push(FieldError::min_length(field, min));
        }
        self
    }

    #[must_use]
    pub fn max_length(mut self, field: &str, value: &str, max: usize) -> Self {
        if value.chars().count() > max {
            self.errors.push(FieldError::max_length(field, max));
        }
        self
    }

    /// Inclusive on both ends.
    #[must_use]
    pub fn range(mut self, field: &str, value: i64, min: i64, max: i64) -> Self {
        if value < min || value > max {
            self.errors.push(FieldError::range(field, min, max));
        }
        self
    }

    /// An uncompilable pattern is reported as `invalid_pattern` on the field.
    #[must_use]
    pub fn pattern(mut self, field: &str, value: &str, pattern: &str) -> Self {
        match regex::Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(value) {
                    self.errors.push(FieldError::pattern(field, pattern));
                }
            }
            Err(e) => {
                warn!(field = %field, pattern = %pattern, error = %e, "Invalid validation regex pattern");
                self.errors
                    .push(FieldError::new(field, "Invalid validation pattern", "invalid_pattern"));
            }
        }
        self
    }

    /// See [`is_valid_email`].
    #[must_use]
    pub fn email(mut self, field: &str, value: &str) -> Self {
        if !is_valid_email(value) {
            self.errors.push(FieldError::email(field));
        }
        self
    }

    /// Fails with `message` when `predicate` returns false.
    #[must_use]
    pub fn custom<F>(mut self, field: &str, predicate: F, message: &str) -> Self
    where
        F: FnOnce() -> bool,
    {
        if !predicate() {
            self.errors.push(FieldError::custom(field, message));
        }
        self
    }

    pub fn build(self) -> ValidationResult {
        ValidationResult::from_errors(self.errors)
    }
}

/// Loose email check: one `@`, something on both sides, a dot in the domain.
pub fn is_valid_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

// =============================================================================
// Names and payloads
// =============================================================================

/// Validate a single router child name.
///
/// Names are non-empty and limited to ASCII alphanumerics, `_` and `-`, so
/// a dotted route always splits back into the names it was built from.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if let Some(invalid) = name
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '-')
    {
        return Err(format!("contains invalid character '{}'", invalid));
    }
    Ok(())
}

/// Validate input size against the configured limit.
///
/// Scalars are estimated without serializing; compound values are measured.
///
/// # Errors
///
/// Returns `PAYLOAD_TOO_LARGE` if the input exceeds `max_input_size`.
pub fn validate_input_size(input: &Value, config: &RpcConfig) -> Result<(), RpcError> {
    let size = match input {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(_) => 20,
        Value::String(s) => s.len() + 2,
        Value::Array(arr) if arr.is_empty() => 2,
        Value::Object(obj) if obj.is_empty() => 2,
        _ => serde_json::to_vec(input).map(|v| v.len()).unwrap_or(0),
    };

    if size > config.max_input_size {
        warn!(size, max = config.max_input_size, "Input exceeds maximum size");
        return Err(RpcError::payload_too_large(format!(
            "Input size {} bytes exceeds maximum {} bytes",
            size, config.max_input_size
        )));
    }
    Ok(())
}
