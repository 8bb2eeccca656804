//! Router builder

use super::{
    compiled::CompiledRouter,
    types::{Procedure, Registration},
};
use crate::{
    Context, ProcedureType, RegistryError, RpcResult,
    handler::{Handler, into_boxed},
    middleware::{MiddlewareFn, Next, Request},
    subscription::{SubscriptionHandler, into_boxed_subscription},
    validation::Validate,
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// Type-safe router with builder pattern
///
/// Registration never fails; duplicate or malformed paths are reported by
/// [`compile`](Self::compile).
///
/// # Example
/// ```rust,ignore
/// let router = Router::new()
///     .middleware(logging)
///     .query("hello", hello)
///     .subscription("teststream", test_stream)
///     .merge("user", user_router());
///
/// let compiled = router.compile()?;
/// ```
pub struct Router<Ctx: Clone + Send + Sync + 'static> {
    pub(crate) registrations: Vec<Registration<Ctx>>,
    pub(crate) middleware: Vec<MiddlewareFn<Ctx>>,
}

impl<Ctx: Clone + Send + Sync + 'static> Default for Router<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx: Clone + Send + Sync + 'static> Router<Ctx> {
    /// Create an empty router
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Add middleware wrapping every query and mutation of this router.
    ///
    /// Middleware is executed in the order it's added.
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context<Ctx>, Request, Next<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = RpcResult<serde_json::Value>> + Send + 'static,
    {
        self.middleware
            .push(Arc::new(move |ctx, req, next| Box::pin(f(ctx, req, next))));
        self
    }

    /// Add a pre-wrapped middleware function, such as
    /// [`logging_middleware`](crate::logging::logging_middleware).
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn middleware_fn(mut self, middleware: MiddlewareFn<Ctx>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Add a query procedure (read-only operation)
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn query<N, Input, Output, H>(self, name: N, handler: H) -> Self
    where
        N: Into<String>,
        Input: DeserializeOwned + Validate + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.register(
            name.into(),
            Procedure::Handler {
                handler: into_boxed(handler),
                procedure_type: ProcedureType::Query,
            },
        )
    }

    /// Add a mutation procedure (write operation)
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn mutation<N, Input, Output, H>(self, name: N, handler: H) -> Self
    where
        N: Into<String>,
        Input: DeserializeOwned + Validate + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.register(
            name.into(),
            Procedure::Handler {
                handler: into_boxed(handler),
                procedure_type: ProcedureType::Mutation,
            },
        )
    }

    /// Add a subscription procedure (streaming)
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn subscription<N, Input, Output, H>(self, name: N, handler: H) -> Self
    where
        N: Into<String>,
        Input: DeserializeOwned + Validate + Send + 'static,
        Output: Serialize + Send + 'static,
        H: SubscriptionHandler<Ctx, Input, Output>,
    {
        self.register(
            name.into(),
            Procedure::Subscription {
                handler: into_boxed_subscription(handler),
            },
        )
    }

    /// Nest another router under a namespace.
    ///
    /// Procedures of `other` become `namespace.<path>`. Middleware added to
    /// `other` keeps applying only to its own procedures, inside this
    /// router's middleware.
    ///
    /// ```rust,ignore
    /// let router = Router::new().merge("user", user_router());
    /// // user.getById, user.list, ...
    /// ```
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn merge<N: Into<String>>(mut self, namespace: N, other: Router<Ctx>) -> Self {
        let namespace = namespace.into();
        let Router {
            registrations,
            middleware,
        } = other;

        for mut registration in registrations {
            if !namespace.is_empty() {
                registration.path = format!("{}.{}", namespace, registration.path);
            }
            let mut scoped = middleware.clone();
            scoped.append(&mut registration.scoped_middleware);
            registration.scoped_middleware = scoped;
            self.registrations.push(registration);
        }
        self
    }

    /// Paths registered so far, in registration order
    pub fn paths(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.path.as_str()).collect()
    }

    /// Build the static lookup tree and pre-compose middleware chains.
    ///
    /// # Errors
    ///
    /// Fails on the first duplicated path, malformed path, or path used as
    /// both a procedure and a namespace.
    pub fn compile(self) -> Result<CompiledRouter<Ctx>, RegistryError> {
        CompiledRouter::build(self)
    }

    fn register(mut self, path: String, procedure: Procedure<Ctx>) -> Self {
        tracing::trace!(
            path = %path,
            procedure_type = %procedure.procedure_type(),
            "Procedure registered"
        );
        self.registrations.push(Registration {
            path,
            procedure,
            scoped_middleware: Vec::new(),
        });
        self
    }
}
