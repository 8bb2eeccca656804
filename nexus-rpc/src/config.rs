//! Server-side configuration
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc::{BatchConfig, RpcConfig};
//! use std::time::Duration;
//!
//! let config = RpcConfig::new()
//!     .with_max_input_size(512 * 1024)
//!     .with_channel_buffer(64)
//!     .with_batch_config(BatchConfig::new().with_max_batch_size(50))
//!     .with_keep_alive(Duration::from_secs(10));
//! config.validate()?;
//! ```

use crate::batch::BatchConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Allowance per call for the envelope around its input: the path, the
/// `{"path":..,"input":..}` framing and the separators of a batch array.
pub const CALL_ENVELOPE_OVERHEAD: usize = 4 * 1024;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// max_input_size must be greater than 0
    #[error("max_input_size must be greater than 0")]
    InvalidMaxInputSize,
    /// channel_buffer must be greater than 0
    #[error("channel_buffer must be greater than 0")]
    InvalidChannelBuffer,
    /// batch.max_batch_size must be greater than 0
    #[error("batch.max_batch_size must be greater than 0")]
    InvalidBatchSize,
    /// A duration setting is zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    /// base_path must start with '/' and not end with one
    #[error("invalid base_path '{0}': must start with '/' and not end with '/'")]
    InvalidBasePath(String),
}

/// Server configuration.
///
/// Every field has a default, so a partial document deserializes cleanly.
/// Durations are expressed in milliseconds when (de)serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Mount point of the HTTP routes (default: `/api/rpc`)
    pub base_path: String,
    /// Maximum serialized input size per call in bytes (default: 1 MiB).
    /// The HTTP body limit is derived from it, see [`RpcConfig::max_body_size`].
    pub max_input_size: usize,
    /// Buffer between a subscription producer and its transport (default: 32)
    pub channel_buffer: usize,
    /// Batch limits
    pub batch: BatchConfig,
    /// Interval of SSE keep-alive comments (default: 15s)
    #[serde(with = "duration_ms")]
    pub keep_alive: Duration,
    /// Deadline for the context factory (default: 5s)
    #[serde(with = "duration_ms")]
    pub context_timeout: Duration,
    /// Time allowed for subscriptions to stop on shutdown (default: 5s)
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            base_path: "/api/rpc".to_string(),
            max_input_size: 1024 * 1024,
            channel_buffer: 32,
            batch: BatchConfig::default(),
            keep_alive: Duration::from_secs(15),
            context_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl RpcConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the route prefix.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Set the maximum input size in bytes.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Set the subscription channel buffer.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_channel_buffer(mut self, size: usize) -> Self {
        self.channel_buffer = size;
        self
    }

    /// Set the batch configuration.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Set the SSE keep-alive interval.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Set the context factory deadline.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_context_timeout(mut self, timeout: Duration) -> Self {
        self.context_timeout = timeout;
        self
    }

    /// Set the shutdown grace period.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Largest request body accepted over HTTP.
    ///
    /// A full batch of calls, each carrying an input of `max_input_size`
    /// bytes, fits. The input limit itself is enforced per call, so a call
    /// is accepted or refused the same way alone and inside a batch.
    pub fn max_body_size(&self) -> usize {
        self.max_input_size
            .saturating_add(CALL_ENVELOPE_OVERHEAD)
            .saturating_mul(self.batch.max_batch_size.max(1))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.base_path.starts_with('/') || self.base_path.ends_with('/') {
            return Err(ConfigValidationError::InvalidBasePath(
                self.base_path.clone(),
            ));
        }
        if self.max_input_size == 0 {
            return Err(ConfigValidationError::InvalidMaxInputSize);
        }
        if self.channel_buffer == 0 {
            return Err(ConfigValidationError::InvalidChannelBuffer);
        }
        if self.batch.max_batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize);
        }
        if self.keep_alive.is_zero() {
            return Err(ConfigValidationError::ZeroDuration("keep_alive"));
        }
        if self.context_timeout.is_zero() {
            return Err(ConfigValidationError::ZeroDuration("context_timeout"));
        }
        Ok(())
    }
}

/// Serialize a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
