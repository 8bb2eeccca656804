//! Error types for RPC operations
//!
//! # Error Codes
//!
//! Error codes are represented by the [`RpcErrorCode`] enum. When serialized,
//! codes are converted to SCREAMING_SNAKE_CASE strings (`NotFound` becomes
//! `"NOT_FOUND"`).
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc::{RpcError, RpcErrorCode};
//!
//! let error = RpcError::new(RpcErrorCode::NotFound, "User not found");
//! let error = RpcError::not_found("User not found"); // Convenience method
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Type-safe error codes for RPC operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorCode {
    /// The request envelope was malformed, or a procedure was called with
    /// the wrong operation kind
    BadRequest,
    /// Authentication is required
    Unauthorized,
    /// The authenticated caller lacks permission
    Forbidden,
    /// The path does not resolve to a registered procedure, or a handler
    /// could not find the requested resource
    NotFound,
    /// Input failed to decode or failed its validation rule
    ValidationError,
    /// The request conflicts with current state
    Conflict,
    /// The request payload exceeds size limits
    PayloadTooLarge,
    /// Context construction or handler execution failed unexpectedly
    Internal,
    /// The subscription was terminated by the client
    Cancelled,
}

impl RpcErrorCode {
    /// Returns the wire representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Conflict => "CONFLICT",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Internal => "INTERNAL",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Returns true if the caller is at fault (4xx equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest
                | Self::Unauthorized
                | Self::Forbidden
                | Self::NotFound
                | Self::ValidationError
                | Self::Conflict
                | Self::PayloadTooLarge
        )
    }

    /// HTTP status used when the error rejects a whole request rather than
    /// one slot of a batch.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest | Self::ValidationError => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PayloadTooLarge => 413,
            Self::Cancelled => 499,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RPC error with type-safe code and message.
///
/// `cause` is kept for server-side logging only and is never serialized.
///
/// # Example
/// ```rust,ignore
/// use nexus_rpc::RpcError;
///
/// let error = RpcError::not_found("User not found")
///     .with_details(serde_json::json!({"user_id": 123}))
///     .with_cause("lookup returned no rows");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Type-safe error code
    pub code: RpcErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional structured details (field errors, requested path, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Diagnostic cause, never sent to clients
    #[serde(skip)]
    pub cause: Option<String>,
}

impl RpcError {
    /// Message every sanitized internal error carries.
    pub const INTERNAL_MESSAGE: &'static str = "An internal error occurred";

    /// Create a new error with code and message.
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            cause: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    /// Add a cause string for debugging.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Strip internal diagnostics before the error leaves the process.
    ///
    /// `INTERNAL` errors keep only their code and a generic message; every
    /// other code keeps message and details.
    pub fn sanitize(mut self) -> Self {
        if self.code == RpcErrorCode::Internal {
            self.message = Self::INTERNAL_MESSAGE.to_string();
            self.details = None;
        }
        self.cause = None;
        self
    }

    /// Create a NOT_FOUND error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::NotFound, message)
    }

    /// Create the NOT_FOUND error for a path that does not resolve.
    pub fn procedure_not_found(path: &str) -> Self {
        Self::new(
            RpcErrorCode::NotFound,
            format!("Procedure '{}' not found", path),
        )
        .with_details(serde_json::json!({ "path": path }))
    }

    /// Create a BAD_REQUEST error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::BadRequest, message)
    }

    /// Create a VALIDATION_ERROR error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ValidationError, message)
    }

    /// Create an UNAUTHORIZED error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Unauthorized, message)
    }

    /// Create a FORBIDDEN error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Forbidden, message)
    }

    /// Create an INTERNAL error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Internal, message)
    }

    /// Create a CONFLICT error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Conflict, message)
    }

    /// Create a PAYLOAD_TOO_LARGE error.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::PayloadTooLarge, message)
    }

    /// Create a CANCELLED error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Cancelled, message)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal("JSON serialization failed").with_cause(err.to_string())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        Self::internal("IO error").with_cause(err.to_string())
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Fatal router configuration errors, reported by [`Router::compile`](crate::Router::compile).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two procedures were registered under the same full path.
    #[error("procedure '{path}' is registered more than once")]
    DuplicatePath {
        /// The duplicated path
        path: String,
    },
    /// A procedure path is not a dotted identifier.
    #[error("invalid procedure path '{path}': {reason}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Why the path was rejected
        reason: String,
    },
    /// A path is used both as a procedure and as a namespace.
    #[error("'{path}' is both a procedure and a namespace")]
    LeafNamespaceConflict {
        /// The conflicting prefix
        path: String,
    },
}
