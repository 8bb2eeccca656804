//! Events pushed by subscription producers

use crate::RpcError;
use serde::{Deserialize, Serialize};

/// One value of a subscription stream with optional SSE metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event<T> {
    /// The event data
    pub data: T,
    /// Event ID for resumption (sent as the SSE `id` field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Reconnect hint in milliseconds (sent as the SSE `retry` field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl<T> Event<T> {
    /// Create a new event with just data
    pub fn new(data: T) -> Self {
        Self {
            data,
            id: None,
            retry: None,
        }
    }

    /// Create an event with an ID
    pub fn with_id(data: T, id: impl Into<String>) -> Self {
        Self {
            data,
            id: Some(id.into()),
            retry: None,
        }
    }

    /// Set the reconnect hint
    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// Transform the payload, keeping metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        Event {
            data: f(self.data),
            id: self.id,
            retry: self.retry,
        }
    }
}

/// Message delivered to the transport for one subscription.
///
/// A stream yields any number of `Data` messages followed by exactly one
/// terminal `Completed` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SubscriptionEvent {
    /// A pushed value
    Data {
        /// Event payload
        payload: Event<serde_json::Value>,
    },
    /// The producer failed or the subscription was cancelled
    Error {
        /// Sanitized error
        payload: RpcError,
    },
    /// The producer finished normally
    Completed,
}

impl SubscriptionEvent {
    /// Create a data message
    pub fn data(payload: Event<serde_json::Value>) -> Self {
        Self::Data { payload }
    }

    /// Create a terminal error message
    pub fn error(err: RpcError) -> Self {
        Self::Error {
            payload: err.sanitize(),
        }
    }

    /// True for `Completed` and `Error`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Data { .. })
    }
}
