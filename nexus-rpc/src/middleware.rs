//! Middleware support for request/response processing
//!
//! Middleware wraps query and mutation execution in onion order: the first
//! middleware added is the outermost layer. Each layer sees the raw JSON
//! input before it is decoded and validated by the procedure.

use crate::{Context, ProcedureType, RpcResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Request information passed to middleware
#[derive(Clone, Debug)]
pub struct Request {
    /// Full path of the procedure (e.g., "user.getById")
    pub path: String,
    /// Type of procedure
    pub procedure_type: ProcedureType,
    /// Input data as JSON
    pub input: serde_json::Value,
    /// Correlation id of the enclosing HTTP request
    pub request_id: String,
}

impl Request {
    /// First path segment
    pub fn namespace(&self) -> Option<&str> {
        self.path.split('.').next()
    }

    /// Last path segment
    pub fn procedure(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// Response type (JSON value)
pub type Response = serde_json::Value;

/// Boxed future returned by middleware layers
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Next function in the middleware chain
pub type Next<Ctx> =
    Arc<dyn Fn(Context<Ctx>, Request) -> BoxFuture<RpcResult<Response>> + Send + Sync>;

/// Middleware function type
pub type MiddlewareFn<Ctx> =
    Arc<dyn Fn(Context<Ctx>, Request, Next<Ctx>) -> BoxFuture<RpcResult<Response>> + Send + Sync>;

/// Wrap an async function as middleware.
///
/// ```rust,ignore
/// async fn timing<Ctx>(ctx: Context<Ctx>, req: Request, next: Next<Ctx>) -> RpcResult<Response> {
///     let start = std::time::Instant::now();
///     let result = next(ctx, req).await;
///     tracing::debug!(elapsed = ?start.elapsed());
///     result
/// }
///
/// let router = Router::new().middleware_fn(from_fn(timing));
/// ```
pub fn from_fn<Ctx, F, Fut>(f: F) -> MiddlewareFn<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
    F: Fn(Context<Ctx>, Request, Next<Ctx>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Response>> + Send + 'static,
{
    Arc::new(move |ctx, req, next| Box::pin(f(ctx, req, next)))
}

/// Compose middleware around a final handler.
///
/// Given `[m1, m2, m3]` and handler `h`, execution runs
/// `m1 → m2 → m3 → h → m3 → m2 → m1`.
pub(crate) fn build_middleware_chain<Ctx: Clone + Send + Sync + 'static>(
    middleware: &[MiddlewareFn<Ctx>],
    final_handler: Next<Ctx>,
) -> Next<Ctx> {
    middleware.iter().rev().fold(final_handler, |next, mw| {
        let mw = mw.clone();
        Arc::new(move |ctx, req| {
            let mw = mw.clone();
            let next = next.clone();
            Box::pin(async move { (mw)(ctx, req, next).await })
        })
    })
}
