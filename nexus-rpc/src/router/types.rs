//! Internal procedure representations shared by the builder and the
//! compiled tree.

use crate::{
    ProcedureType,
    handler::BoxedHandler,
    middleware::{MiddlewareFn, Next},
    subscription::BoxedSubscriptionHandler,
};

/// Handler registered on a builder, before compilation
pub(crate) enum Procedure<Ctx: Clone + Send + Sync + 'static> {
    /// Query or mutation
    Handler {
        handler: BoxedHandler<Ctx>,
        procedure_type: ProcedureType,
    },
    /// Subscription
    Subscription {
        handler: BoxedSubscriptionHandler<Ctx>,
    },
}

impl<Ctx: Clone + Send + Sync + 'static> Procedure<Ctx> {
    pub(crate) fn procedure_type(&self) -> ProcedureType {
        match self {
            Self::Handler { procedure_type, .. } => *procedure_type,
            Self::Subscription { .. } => ProcedureType::Subscription,
        }
    }
}

/// A registered leaf with the middleware of the routers it was merged from
pub(crate) struct Registration<Ctx: Clone + Send + Sync + 'static> {
    pub(crate) path: String,
    pub(crate) procedure: Procedure<Ctx>,
    pub(crate) scoped_middleware: Vec<MiddlewareFn<Ctx>>,
}

/// Executable form of a leaf
pub(crate) enum Target<Ctx: Clone + Send + Sync + 'static> {
    /// Query or mutation with its pre-built middleware chain
    Call(Next<Ctx>),
    /// Subscription producer
    Subscription(BoxedSubscriptionHandler<Ctx>),
}
