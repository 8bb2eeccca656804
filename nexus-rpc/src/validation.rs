//! Input validation
//!
//! Every procedure input type implements [`Validate`]. The router decodes the
//! JSON payload into the input type and runs its rule before the handler is
//! invoked, so handlers never observe invalid input.
//!
//! # Example
//!
//! ```rust,ignore
//! use nexus_rpc::validation::{Validate, ValidationResult, ValidationRules};
//!
//! #[derive(Deserialize)]
//! struct CreateUserInput {
//!     name: String,
//!     email: String,
//! }
//!
//! impl Validate for CreateUserInput {
//!     fn validate(&self) -> ValidationResult {
//!         ValidationRules::new()
//!             .required("name", &self.name)
//!             .max_length("name", &self.name, 100)
//!             .email("email", &self.email)
//!             .build()
//!     }
//! }
//! ```

use crate::subscription::SubscriptionId;
use crate::{RpcError, RpcErrorCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Validation error for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The name of the field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable kind of failure (`required`, `email`, ...)
    pub code: String,
}

impl FieldError {
    /// Create a new field error
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

    /// Field is missing or blank
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{} is required", field);
        Self::new(field, message, "required")
    }

    /// Field is shorter than `min` characters
    pub fn min_length(field: impl Into<String>, min: usize) -> Self {
        let field = field.into();
        let message = format!("{} must be at least {} characters", field, min);
        Self::new(field, message, "min_length")
    }

    /// Field is longer than `max` characters
    pub fn max_length(field: impl Into<String>, max: usize) -> Self {
        let field = field.into();
        let message = format!("{} must be at most {} characters", field, max);
        Self::new(field, message, "max_length")
    }

    /// Number outside `min..=max`
    pub fn range(field: impl Into<String>, min: i64, max: i64) -> Self {
        let field = field.into();
        let message = format!("{} must be between {} and {}", field, min, max);
        Self::new(field, message, "range")
    }

    /// String does not match `pattern`
    pub fn pattern(field: impl Into<String>, pattern: &str) -> Self {
        let field = field.into();
        let message = format!("{} must match pattern: {}", field, pattern);
        Self::new(field, message, "pattern")
    }

    /// String is not an email address
    pub fn email(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{} must be a valid email address", field);
        Self::new(field, message, "email")
    }

    /// Custom rule failure
    pub fn custom(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(field, message, "custom")
    }

    /// Payload could not be decoded into the input type
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new("input", message, "decode")
    }
}

/// Outcome of validating one input value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the input is valid
    pub valid: bool,
    /// Field-level errors, empty when valid
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    /// A passing result
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Build a result from collected errors; an empty list is a pass.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if !errors.is_empty() {
            let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            debug!(error_count = errors.len(), fields = ?fields, "Validation failed");
        }
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Group errors by field name
    pub fn errors_by_field(&self) -> HashMap<String, Vec<&FieldError>> {
        let mut map: HashMap<String, Vec<&FieldError>> = HashMap::new();
        for error in &self.errors {
            map.entry(error.field.clone()).or_default().push(error);
        }
        map
    }

    /// Combine with another result; the union fails if either fails.
    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.errors.extend(other.errors);
        self.valid = self.errors.is_empty();
        self
    }

    /// Turn a failing result into the `VALIDATION_ERROR` sent to clients.
    ///
    /// Returns `Ok(())` when the result is valid.
    pub fn into_rpc_result(self) -> Result<(), RpcError> {
        if self.valid {
            return Ok(());
        }
        Err(validation_error(self.errors))
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Build a `VALIDATION_ERROR` carrying `details.fields`.
pub fn validation_error(fields: Vec<FieldError>) -> RpcError {
    RpcError::new(RpcErrorCode::ValidationError, "Input validation failed")
        .with_details(serde_json::json!({ "fields": fields }))
}

/// Input rule of a procedure.
///
/// The default rule accepts every value that decodes; override `validate`
/// to add field checks.
pub trait Validate {
    /// Check the decoded value
    fn validate(&self) -> ValidationResult {
        ValidationResult::ok()
    }
}

impl Validate for () {}

impl Validate for serde_json::Value {}

impl Validate for String {}

impl Validate for bool {}

impl Validate for i64 {}

impl Validate for u64 {}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> ValidationResult {
        match self {
            Some(value) => value.validate(),
            None => ValidationResult::ok(),
        }
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> ValidationResult {
        self.iter()
            .map(Validate::validate)
            .fold(ValidationResult::ok(), ValidationResult::merge)
    }
}

/// Fluent builder for common rules.
///
/// ```rust,ignore
/// let result = ValidationRules::new()
///     .required("name", &input.name)
///     .min_length("name", &input.name, 2)
///     .range("age", input.age, 0, 150)
///     .pattern("phone", &input.phone, r"^\+?[0-9]{10,15}$")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ValidationRules {
    errors: Vec<FieldError>,
}

impl ValidationRules {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Record a prepared error
    pub fn add_error(mut self, error: FieldError) -> Self {
        self.errors.push(error);
        self
    }

    /// String must not be blank
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            trace!(field = %field, "Required field is empty");
            self.errors.push(FieldError::required(field));
        }
        self
    }

    /// String must have at least `min` characters
    pub fn min_length(mut self, field: &str, value: &str, min: usize) -> Self {
        if value.chars().count() < min {
            trace!(field = %field, min = min, "Field below minimum length");
            self.errors.push(FieldError::min_length(field, min));
        }
        self
    }

    /// String must have at most `max` characters
    pub fn max_length(mut self, field: &str, value: &str, max: usize) -> Self {
        if value.chars().count() > max {
            trace!(field = %field, max = max, "Field exceeds maximum length");
            self.errors.push(FieldError::max_length(field, max));
        }
        self
    }

    /// Number must be within `min..=max`
    pub fn range(mut self, field: &str, value: i64, min: i64, max: i64) -> Self {
        if value < min || value > max {
            trace!(field = %field, value = value, "Field outside valid range");
            self.errors.push(FieldError::range(field, min, max));
        }
        self
    }

    /// String must match a regex
    pub fn pattern(mut self, field: &str, value: &str, pattern: &str) -> Self {
        match regex::Regex::new(pattern) {
            Ok(re) if re.is_match(value) => {}
            Ok(_) => {
                trace!(field = %field, pattern = %pattern, "Field does not match pattern");
                self.errors.push(FieldError::pattern(field, pattern));
            }
            Err(e) => {
                warn!(field = %field, pattern = %pattern, error = %e, "Invalid validation regex pattern");
                self.errors.push(FieldError::new(
                    field,
                    format!("Invalid validation pattern: {}", pattern),
                    "invalid_pattern",
                ));
            }
        }
        self
    }

    /// String must look like `local@domain.tld`
    pub fn email(mut self, field: &str, value: &str) -> Self {
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid {
            trace!(field = %field, "Invalid email format");
            self.errors.push(FieldError::email(field));
        }
        self
    }

    /// Arbitrary predicate
    pub fn custom<F>(mut self, field: &str, predicate: F, message: &str) -> Self
    where
        F: FnOnce() -> bool,
    {
        if !predicate() {
            self.errors.push(FieldError::custom(field, message));
        }
        self
    }

    /// Finish and produce the result
    pub fn build(self) -> ValidationResult {
        ValidationResult::from_errors(self.errors)
    }
}

// =============================================================================
// Envelope checks
// =============================================================================

/// Check the shape of a dotted procedure path.
///
/// A valid path is non-empty, has no leading, trailing, or doubled dots, and
/// contains only ASCII alphanumerics, `_` and `.`.
pub fn check_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path cannot be empty".to_string());
    }
    if path.starts_with('.') || path.ends_with('.') {
        return Err("path cannot start or end with a dot".to_string());
    }
    if path.contains("..") {
        return Err("path cannot contain consecutive dots".to_string());
    }
    if let Some(ch) = path
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.')
    {
        return Err(format!("invalid character '{}'", ch));
    }
    Ok(())
}

/// Reject malformed paths sent by a client.
///
/// A malformed path cannot name any procedure, so it is reported as
/// `NOT_FOUND` like any other unknown path.
pub fn validate_path(path: &str) -> Result<(), RpcError> {
    check_path(path).map_err(|reason| {
        trace!(path = %path, reason = %reason, "Rejected malformed path");
        RpcError::procedure_not_found(path)
    })
}

/// Reject inputs whose serialized size exceeds `max_size` bytes.
pub fn validate_input_size(input: &serde_json::Value, max_size: usize) -> Result<(), RpcError> {
    use serde_json::Value;

    let size = match input {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Number(n) => n.to_string().len(),
        Value::String(s) => s.len() + 2,
        _ => serde_json::to_vec(input).map(|v| v.len())?,
    };

    if size > max_size {
        return Err(RpcError::payload_too_large(format!(
            "Input size {} bytes exceeds maximum {} bytes",
            size, max_size
        )));
    }
    Ok(())
}

/// Parse a client-supplied subscription id, with or without the `sub_` prefix.
pub fn validate_subscription_id(id: &str) -> Result<SubscriptionId, RpcError> {
    if id.is_empty() {
        return Err(RpcError::bad_request("Subscription ID cannot be empty"));
    }
    SubscriptionId::parse_lenient(id)
        .map_err(|e| RpcError::bad_request(format!("Invalid subscription ID '{}': {}", id, e)))
}
