//! Subscription identifiers

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error parsing a subscription ID
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Subscription ID must start with 'sub_' prefix
    #[error("Subscription ID must start with 'sub_' prefix")]
    MissingPrefix,

    /// Invalid UUID format
    #[error("Invalid UUID format: {0}")]
    InvalidUuid(#[from] uuid::Error),
}

/// Time-ordered subscription identifier (UUID v7).
///
/// Displayed and serialized as `sub_<uuid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new subscription ID using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse the canonical `sub_<uuid>` form.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let uuid_str = s.strip_prefix("sub_").ok_or(ParseError::MissingPrefix)?;
        Ok(Self(Uuid::parse_str(uuid_str)?))
    }

    /// Parse with or without the `sub_` prefix.
    pub fn parse_lenient(s: &str) -> Result<Self, ParseError> {
        let uuid_str = s.strip_prefix("sub_").unwrap_or(s);
        Ok(Self(Uuid::parse_str(uuid_str)?))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

impl From<Uuid> for SubscriptionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for SubscriptionId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s)
    }
}

impl Serialize for SubscriptionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SubscriptionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_lenient(&raw).map_err(serde::de::Error::custom)
    }
}
