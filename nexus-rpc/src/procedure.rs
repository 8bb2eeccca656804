//! Procedure kinds and catalog entries

use serde::{Deserialize, Serialize};

/// Operation kind of a procedure
#[derive(Clone, Debug, PartialEq, Eq, Hash, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureType {
    /// Read-only operation
    Query,
    /// Write operation
    Mutation,
    /// Streaming subscription
    Subscription,
}

impl ProcedureType {
    /// True for queries and mutations, which answer with a single value
    pub fn is_request_response(&self) -> bool {
        matches!(self, Self::Query | Self::Mutation)
    }
}

impl std::fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// One entry of the procedure catalog served at `GET {base}/procedures`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureMeta {
    /// Full dotted path
    pub path: String,
    /// Operation kind
    #[serde(rename = "type")]
    pub procedure_type: ProcedureType,
}
