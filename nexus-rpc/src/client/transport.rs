//! Transport selection

use crate::ProcedureType;
use serde::{Serialize, de::DeserializeOwned};

/// Which link carries a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Coalesced request/response over `POST {base}`
    Batch,
    /// Persistent event stream over `POST {base}/subscribe`
    Stream,
}

impl TransportKind {
    /// Queries and mutations go through the batch link, subscriptions
    /// through the stream link.
    pub const fn for_procedure(kind: ProcedureType) -> Self {
        match kind {
            ProcedureType::Query | ProcedureType::Mutation => Self::Batch,
            ProcedureType::Subscription => Self::Stream,
        }
    }
}

/// Compile-time description of one server procedure.
///
/// ```rust,ignore
/// struct GetUser;
///
/// impl Procedure for GetUser {
///     const PATH: &'static str = "user.getById";
///     const KIND: ProcedureType = ProcedureType::Query;
///     type Input = GetUserInput;
///     type Output = User;
/// }
///
/// let user = client.call::<GetUser>(GetUserInput { id: "1".into() }).await?;
/// ```
pub trait Procedure {
    /// Full dotted path
    const PATH: &'static str;
    /// Operation kind
    const KIND: ProcedureType;
    /// Input payload
    type Input: Serialize;
    /// Output value, or event payload for subscriptions
    type Output: DeserializeOwned;
}
