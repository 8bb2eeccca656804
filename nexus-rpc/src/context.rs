//! Request context and its per-request factory

use crate::{RpcError, RpcResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Header carrying a client-chosen correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context wrapper handed to every handler and middleware.
///
/// Built once per request; cloning shares the same value.
#[derive(Clone)]
pub struct Context<T: Clone + Send + Sync + 'static> {
    inner: Arc<T>,
}

impl<T: Clone + Send + Sync + 'static> Context<T> {
    /// Wrap a freshly built context value
    pub fn new(ctx: T) -> Self {
        Self {
            inner: Arc::new(ctx),
        }
    }

    /// Borrow the inner value
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Shared handle to the inner value
    pub fn arc(&self) -> Arc<T> {
        self.inner.clone()
    }
}

impl<T: Clone + Send + Sync + 'static> std::ops::Deref for Context<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Transport-level facts about one incoming request.
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Correlation id, taken from `x-request-id` or generated
    pub request_id: String,
    /// All request headers
    pub headers: BTreeMap<String, String>,
}

impl RequestMeta {
    /// Metadata with a fresh UUID v7 request id and no headers
    pub fn new() -> Self {
        Self {
            request_id: generate_request_id(),
            headers: BTreeMap::new(),
        }
    }

    /// Build metadata from header pairs, reusing `x-request-id` when present
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers: BTreeMap<String, String> = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .unwrap_or_else(generate_request_id);
        Self {
            request_id,
            headers,
        }
    }

    /// Add or replace one header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Raw `authorization` header
    pub fn authorization(&self) -> Option<&str> {
        self.header("authorization")
    }

    /// Token of a `Bearer <token>` authorization header.
    ///
    /// `None` when the header is absent or uses another scheme.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.authorization()?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    }
}

/// New UUID v7 correlation id
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext)).to_string()
}

/// Builds the context value for one request.
///
/// Called exactly once per HTTP request: once for a whole batch and once for
/// the lifetime of a subscription. An error aborts the request before any
/// handler runs.
///
/// Implemented for async closures taking [`RequestMeta`]:
///
/// ```rust,ignore
/// let factory = |meta: RequestMeta| async move {
///     Ok(AppContext { request_id: meta.request_id })
/// };
/// ```
#[async_trait]
pub trait ContextFactory<Ctx>: Send + Sync + 'static
where
    Ctx: Clone + Send + Sync + 'static,
{
    /// Produce the context for one request
    async fn create(&self, meta: &RequestMeta) -> RpcResult<Ctx>;
}

#[async_trait]
impl<Ctx, F, Fut> ContextFactory<Ctx> for F
where
    Ctx: Clone + Send + Sync + 'static,
    F: Fn(RequestMeta) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Ctx>> + Send + 'static,
{
    async fn create(&self, meta: &RequestMeta) -> RpcResult<Ctx> {
        (self)(meta.clone()).await
    }
}

/// Factory that hands out clones of one value.
///
/// Useful for tests and for services whose context carries only shared
/// handles (pools, caches).
#[derive(Debug, Clone)]
pub struct StaticContext<T>(pub T);

#[async_trait]
impl<T> ContextFactory<T> for StaticContext<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn create(&self, _meta: &RequestMeta) -> RpcResult<T> {
        Ok(self.0.clone())
    }
}

/// Shared, type-erased factory held by the dispatcher
pub type SharedContextFactory<Ctx> = Arc<dyn ContextFactory<Ctx>>;

/// Run a factory under a deadline; any failure becomes `INTERNAL`.
pub(crate) async fn build_context<Ctx>(
    factory: &dyn ContextFactory<Ctx>,
    meta: &RequestMeta,
    timeout: std::time::Duration,
) -> RpcResult<Context<Ctx>>
where
    Ctx: Clone + Send + Sync + 'static,
{
    match tokio::time::timeout(timeout, factory.create(meta)).await {
        Ok(Ok(ctx)) => Ok(Context::new(ctx)),
        Ok(Err(err)) => {
            tracing::warn!(
                request_id = %meta.request_id,
                error_code = %err.code,
                error = %err.message,
                cause = ?err.cause,
                "Context factory failed"
            );
            Err(RpcError::internal("Failed to create request context")
                .with_cause(format!("{}: {}", err.code, err.message)))
        }
        Err(_) => {
            tracing::warn!(
                request_id = %meta.request_id,
                timeout_ms = timeout.as_millis() as u64,
                "Context factory timed out"
            );
            Err(RpcError::internal("Failed to create request context")
                .with_cause("context factory timed out"))
        }
    }
}
