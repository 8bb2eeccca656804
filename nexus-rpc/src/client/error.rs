//! Client error type

use crate::{ConfigValidationError, ProcedureType, RpcError, RpcErrorCode};
use thiserror::Error;

/// Everything a client call can fail with.
///
/// Errors are `Clone` because one transport failure is delivered to every
/// call of the batch that carried it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The server answered with an RPC error
    #[error("{0}")]
    Rpc(RpcError),
    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),
    /// The server answered with a non-RPC HTTP failure
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, or the status reason
        message: String,
    },
    /// A payload could not be encoded or decoded
    #[error("decode error: {0}")]
    Decode(String),
    /// The server broke the wire protocol
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The base URL or a header is malformed
    #[error("invalid client setup: {0}")]
    Setup(String),
    /// The client configuration is invalid
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigValidationError),
    /// A procedure was used through the wrong transport
    #[error("'{path}' is a {kind}")]
    WrongKind {
        /// Procedure path
        path: String,
        /// Its actual kind
        kind: ProcedureType,
    },
    /// The batch link stopped before answering
    #[error("client is closed")]
    Closed,
}

impl ClientError {
    /// Code of the RPC error, if the server sent one
    pub fn code(&self) -> Option<RpcErrorCode> {
        match self {
            Self::Rpc(error) => Some(error.code),
            _ => None,
        }
    }

    /// The RPC error, if the server sent one
    pub fn as_rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(error) => Some(error),
            _ => None,
        }
    }
}

impl From<RpcError> for ClientError {
    fn from(error: RpcError) -> Self {
        Self::Rpc(error)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
