//! Common input and output types

use crate::validation::Validate;
use serde::{Deserialize, Deserializer, Serialize};

/// Input type for procedures that take no arguments.
///
/// Accepts `null`, `{}` or a missing input; any other payload is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NoInput;

impl<'de> Deserialize<'de> for NoInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(NoInput)
    }
}

impl Validate for NoInput {}
