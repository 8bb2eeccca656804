//! Request and response envelopes for calls and batches
//!
//! A request body is either one call or an array of calls:
//!
//! ```json
//! {"path": "hello", "input": {"text": "world"}}
//! [{"path": "hello", "input": {"text": "a"}}, {"path": "user.getById", "input": {"id": "1"}}]
//! ```
//!
//! The response mirrors the shape; each slot is `{"ok": value}` or
//! `{"error": {code, message, details?}}`, positionally aligned with the
//! request.

use crate::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

// =============================================================================
// Batch Configuration
// =============================================================================

/// Configuration for batch request processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of calls allowed in a single batch
    pub max_batch_size: usize,
    /// Run the calls of a batch concurrently; when false they run in order
    pub parallel_execution: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            parallel_execution: true,
        }
    }
}

impl BatchConfig {
    /// Create a new batch configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum batch size.
    #[must_use = "This method returns a new BatchConfig and does not modify self"]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set whether to execute calls concurrently.
    #[must_use = "This method returns a new BatchConfig and does not modify self"]
    pub fn with_parallel_execution(mut self, parallel: bool) -> Self {
        self.parallel_execution = parallel;
        self
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One procedure call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Dotted procedure path (e.g., "user.getById")
    pub path: String,
    /// Input payload; `null` when omitted
    #[serde(default)]
    pub input: serde_json::Value,
}

impl CallRequest {
    /// Create a call
    pub fn new(path: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            input,
        }
    }
}

/// Body of `POST {base}`: a single call or an ordered batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcRequest {
    /// Ordered batch of calls
    Batch(Vec<CallRequest>),
    /// A single call
    Single(CallRequest),
}

impl RpcRequest {
    /// Number of calls in the request
    pub fn len(&self) -> usize {
        match self {
            Self::Batch(calls) => calls.len(),
            Self::Single(_) => 1,
        }
    }

    /// True for an empty batch
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the batch size against configuration limits.
    pub fn validate(&self, config: &BatchConfig) -> RpcResult<()> {
        let Self::Batch(calls) = self else {
            return Ok(());
        };
        if calls.is_empty() {
            warn!("Batch validation failed: batch request cannot be empty");
            return Err(RpcError::bad_request("Batch request cannot be empty"));
        }
        if calls.len() > config.max_batch_size {
            warn!(
                batch_size = calls.len(),
                max_size = config.max_batch_size,
                "Batch validation failed: size exceeds maximum"
            );
            return Err(RpcError::bad_request(format!(
                "Batch size {} exceeds maximum allowed size {}",
                calls.len(),
                config.max_batch_size
            )));
        }
        trace!(batch_size = calls.len(), "Batch request validated");
        Ok(())
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Outcome of one call, serialized as `{"ok": ..}` or `{"error": ..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallResult {
    /// Successful result
    Ok(serde_json::Value),
    /// Sanitized error
    Error(RpcError),
}

impl CallResult {
    /// Wrap a handler outcome, sanitizing errors for the wire
    pub fn from_result(result: RpcResult<serde_json::Value>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(error) => Self::Error(error.sanitize()),
        }
    }

    /// Check if the call succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Convert back into a `Result`
    pub fn into_result(self) -> RpcResult<serde_json::Value> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Error(error) => Err(error),
        }
    }
}

/// Response body mirroring [`RpcRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    /// One result per call, in request order
    Batch(Vec<CallResult>),
    /// Result of a single call
    Single(CallResult),
}

impl RpcResponse {
    /// Flatten into per-call results
    pub fn into_results(self) -> Vec<CallResult> {
        match self {
            Self::Batch(results) => results,
            Self::Single(result) => vec![result],
        }
    }
}
