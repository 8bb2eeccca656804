//! Request logging middleware with sensitive-field redaction
//!
//! ```rust,ignore
//! use nexus_rpc::logging::{LogConfig, logging_middleware};
//!
//! let router = Router::new()
//!     .middleware_fn(logging_middleware(LogConfig::new().with_input(true)))
//!     .query("hello", hello);
//! ```

use crate::middleware::{MiddlewareFn, from_fn};
use crate::{Context, Next, Request};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;

/// Replacement written in place of redacted values
pub const DEFAULT_REDACTION_REPLACEMENT: &str = "[REDACTED]";

/// Field names redacted by default; matching is case-insensitive on substrings.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "credential",
    "private_key",
    "ssn",
    "credit_card",
    "card_number",
    "cvv",
];

/// What the logging middleware records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log the (redacted) input of each call
    pub log_input: bool,
    /// Log the (redacted) output of each call
    pub log_output: bool,
    /// Warn when a call takes longer than this many milliseconds
    pub slow_request_threshold_ms: Option<u64>,
    /// Paths that are never logged
    pub excluded_paths: HashSet<String>,
    /// Substrings of field names whose values are redacted
    pub redacted_fields: Vec<String>,
    /// Replacement for redacted values
    pub redaction_replacement: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_input: false,
            log_output: false,
            slow_request_threshold_ms: Some(1000),
            excluded_paths: HashSet::new(),
            redacted_fields: DEFAULT_SENSITIVE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            redaction_replacement: DEFAULT_REDACTION_REPLACEMENT.to_string(),
        }
    }
}

impl LogConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle input logging
    #[must_use]
    pub fn with_input(mut self, enabled: bool) -> Self {
        self.log_input = enabled;
        self
    }

    /// Toggle output logging
    #[must_use]
    pub fn with_output(mut self, enabled: bool) -> Self {
        self.log_output = enabled;
        self
    }

    /// Set or clear the slow-call threshold
    #[must_use]
    pub fn with_slow_threshold_ms(mut self, threshold: Option<u64>) -> Self {
        self.slow_request_threshold_ms = threshold;
        self
    }

    /// Never log calls to `path`
    #[must_use]
    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.excluded_paths.insert(path.into());
        self
    }

    /// Also redact fields containing `field`
    #[must_use]
    pub fn redact_field(mut self, field: impl Into<String>) -> Self {
        self.redacted_fields.push(field.into());
        self
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.redacted_fields
            .iter()
            .any(|field| key.contains(&field.to_lowercase()))
    }
}

/// Copy of `value` with sensitive object fields replaced, at any depth.
pub fn redact_value(value: &Value, config: &LogConfig) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let val = if config.is_sensitive(key) {
                        Value::String(config.redaction_replacement.clone())
                    } else {
                        redact_value(val, config)
                    };
                    (key.clone(), val)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_value(v, config)).collect()),
        other => other.clone(),
    }
}

/// Middleware logging each query and mutation with timing.
///
/// Successful calls log at `debug`, failures at `warn` (client errors at
/// `debug`), and slow calls at `warn`.
pub fn logging_middleware<Ctx>(config: LogConfig) -> MiddlewareFn<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
{
    let config = std::sync::Arc::new(config);
    from_fn(move |ctx: Context<Ctx>, req: Request, next: Next<Ctx>| {
        let config = config.clone();
        async move {
            if config.excluded_paths.contains(&req.path) {
                return next(ctx, req).await;
            }

            let path = req.path.clone();
            let request_id = req.request_id.clone();
            let procedure_type = req.procedure_type;
            if config.log_input {
                tracing::debug!(
                    request_id = %request_id,
                    path = %path,
                    procedure_type = %procedure_type,
                    input = %redact_value(&req.input, &config),
                    "RPC call started"
                );
            }

            let start = Instant::now();
            let result = next(ctx, req).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(output) if config.log_output => tracing::debug!(
                    request_id = %request_id,
                    path = %path,
                    duration_ms,
                    output = %redact_value(output, &config),
                    "RPC call succeeded"
                ),
                Ok(_) => tracing::debug!(
                    request_id = %request_id,
                    path = %path,
                    duration_ms,
                    "RPC call succeeded"
                ),
                Err(error) if error.code.is_client_error() => tracing::debug!(
                    request_id = %request_id,
                    path = %path,
                    duration_ms,
                    error_code = %error.code,
                    "RPC call rejected"
                ),
                Err(error) => tracing::warn!(
                    request_id = %request_id,
                    path = %path,
                    duration_ms,
                    error_code = %error.code,
                    error = %error.message,
                    cause = ?error.cause,
                    "RPC call failed"
                ),
            }

            if let Some(threshold) = config.slow_request_threshold_ms
                && duration_ms > threshold
            {
                tracing::warn!(
                    request_id = %request_id,
                    path = %path,
                    duration_ms,
                    threshold_ms = threshold,
                    "Slow RPC call"
                );
            }

            result
        }
    })
}
