//! Client-side configuration

use crate::ConfigValidationError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Client configuration.
///
/// # Example
/// ```rust,ignore
/// let config = ClientConfig::new()
///     .with_batch_window(Duration::from_millis(5))
///     .with_bearer_token("secret");
/// let client = Client::with_config("http://127.0.0.1:3000/api/rpc", config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long the batch link waits for more calls after the first one
    /// (default: 10ms)
    pub batch_window: Duration,
    /// Calls per batch before it is sent early (default: 100)
    pub max_batch_size: usize,
    /// Serialized size of a batch before it is sent early (default: 1 MiB).
    /// A single call larger than this still travels, alone.
    pub max_batch_bytes: usize,
    /// Deadline for one batch round trip (default: 30s). Subscriptions are
    /// not bounded by it.
    pub request_timeout: Duration,
    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_millis(10),
            max_batch_size: 100,
            max_batch_bytes: 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batching window.
    #[must_use = "This method returns a new ClientConfig and does not modify self"]
    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    /// Set the maximum batch size. `1` disables batching.
    #[must_use = "This method returns a new ClientConfig and does not modify self"]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set the byte budget of one batch.
    #[must_use = "This method returns a new ClientConfig and does not modify self"]
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Set the per-request timeout.
    #[must_use = "This method returns a new ClientConfig and does not modify self"]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Send `name: value` with every request.
    #[must_use = "This method returns a new ClientConfig and does not modify self"]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Send `authorization: Bearer <token>` with every request.
    #[must_use = "This method returns a new ClientConfig and does not modify self"]
    pub fn with_bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.with_header("authorization", value)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigValidationError::ZeroDuration("request_timeout"));
        }
        Ok(())
    }
}
