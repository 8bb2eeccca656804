//! Server-side request dispatcher
//!
//! The dispatcher owns the compiled router, the context factory and the
//! subscription registry. For every incoming request it builds the context
//! once, resolves each call independently and runs the calls of a batch
//! concurrently, answering with positionally aligned results.

use crate::batch::{CallRequest, CallResult, RpcRequest, RpcResponse};
use crate::context::{ContextFactory, RequestMeta, SharedContextFactory, build_context};
use crate::subscription::{
    ActiveSubscription, CancellationSignal, Event, JsonEventStream, ShutdownResult,
    SubscriptionContext, SubscriptionId, SubscriptionManager, SubscriptionStream,
};
use crate::validation::{validate_input_size, validate_path, validate_subscription_id};
use crate::{CompiledRouter, Context, RpcConfig, RpcError, RpcResult};
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Body of `POST {base}/subscribe`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Subscription path
    pub path: String,
    /// Input payload; `null` when omitted
    #[serde(default)]
    pub input: serde_json::Value,
    /// Last event id the client received, for resumption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

impl SubscribeRequest {
    /// Subscribe to `path` with `input`
    pub fn new(path: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            input,
            last_event_id: None,
        }
    }
}

/// Body of `POST {base}/unsubscribe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    /// Id announced in the `started` event
    pub id: String,
}

/// Executes calls and subscriptions against a compiled router.
///
/// Cloning is cheap; clones share the router, factory and registry.
pub struct Dispatcher<Ctx: Clone + Send + Sync + 'static> {
    router: Arc<CompiledRouter<Ctx>>,
    factory: SharedContextFactory<Ctx>,
    config: Arc<RpcConfig>,
    subscriptions: Arc<SubscriptionManager>,
}

impl<Ctx: Clone + Send + Sync + 'static> Clone for Dispatcher<Ctx> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            factory: self.factory.clone(),
            config: self.config.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

impl<Ctx: Clone + Send + Sync + 'static> Dispatcher<Ctx> {
    /// Dispatcher with default configuration
    pub fn new<F>(router: CompiledRouter<Ctx>, factory: F) -> Self
    where
        F: ContextFactory<Ctx>,
    {
        Self {
            router: Arc::new(router),
            factory: Arc::new(factory),
            config: Arc::new(RpcConfig::default()),
            subscriptions: Arc::new(SubscriptionManager::new()),
        }
    }

    /// Replace the configuration
    #[must_use = "This method returns a new Dispatcher and does not modify self"]
    pub fn with_config(mut self, config: RpcConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// The compiled router
    pub fn router(&self) -> &CompiledRouter<Ctx> {
        &self.router
    }

    /// Registry of live subscriptions
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Build the request context; failures and timeouts become `INTERNAL`.
    pub async fn create_context(&self, meta: &RequestMeta) -> RpcResult<Context<Ctx>> {
        build_context(self.factory.as_ref(), meta, self.config.context_timeout).await
    }

    /// Handle one call or batch end to end.
    ///
    /// # Errors
    ///
    /// Errors reject the whole request: an invalid batch envelope
    /// (`BAD_REQUEST`) or a failed context factory (`INTERNAL`). Per-call
    /// failures are reported in their slot instead.
    pub async fn handle(&self, meta: &RequestMeta, request: RpcRequest) -> RpcResult<RpcResponse> {
        request.validate(&self.config.batch)?;
        let ctx = self.create_context(meta).await?;
        Ok(self.execute(&ctx, meta, request).await)
    }

    /// Run a validated request with an already built context.
    pub async fn execute(
        &self,
        ctx: &Context<Ctx>,
        meta: &RequestMeta,
        request: RpcRequest,
    ) -> RpcResponse {
        match request {
            RpcRequest::Single(call) => RpcResponse::Single(self.call_one(ctx, meta, call).await),
            RpcRequest::Batch(calls) => {
                let start = Instant::now();
                let batch_size = calls.len();
                let results = if self.config.batch.parallel_execution {
                    futures::future::join_all(
                        calls.into_iter().map(|call| self.call_one(ctx, meta, call)),
                    )
                    .await
                } else {
                    let mut results = Vec::with_capacity(batch_size);
                    for call in calls {
                        results.push(self.call_one(ctx, meta, call).await);
                    }
                    results
                };
                debug!(
                    request_id = %meta.request_id,
                    batch_size,
                    errors = results.iter().filter(|r| !r.is_ok()).count(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Batch completed"
                );
                RpcResponse::Batch(results)
            }
        }
    }

    async fn call_one(&self, ctx: &Context<Ctx>, meta: &RequestMeta, call: CallRequest) -> CallResult {
        let start = Instant::now();
        let CallRequest { path, input } = call;

        let result = match validate_path(&path)
            .and_then(|_| validate_input_size(&input, self.config.max_input_size))
        {
            Ok(()) => AssertUnwindSafe(self.router.call(ctx.clone(), &path, input, &meta.request_id))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panic_error(panic))),
            Err(error) => Err(error),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(request_id = %meta.request_id, path = %path, duration_ms, "Call succeeded"),
            Err(error) if error.code.is_client_error() => debug!(
                request_id = %meta.request_id,
                path = %path,
                duration_ms,
                error_code = %error.code,
                "Call rejected"
            ),
            Err(error) => warn!(
                request_id = %meta.request_id,
                path = %path,
                duration_ms,
                error_code = %error.code,
                error = %error.message,
                cause = ?error.cause,
                "Call failed"
            ),
        }

        CallResult::from_result(result)
    }

    /// Start a subscription end to end.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `BAD_REQUEST` (not a subscription), `VALIDATION_ERROR`,
    /// `PAYLOAD_TOO_LARGE`, or `INTERNAL` when the context factory or the
    /// handler fails before streaming starts.
    pub async fn subscribe(
        &self,
        meta: &RequestMeta,
        request: SubscribeRequest,
    ) -> RpcResult<SubscriptionStream> {
        let ctx = self.create_context(meta).await?;
        self.subscribe_with(ctx, meta, request).await
    }

    /// Start a subscription with an already built context.
    ///
    /// The context lives as long as the subscription; it is never rebuilt
    /// per emitted value.
    ///
    /// # Errors
    ///
    /// As [`subscribe`](Self::subscribe), minus context failures.
    pub async fn subscribe_with(
        &self,
        ctx: Context<Ctx>,
        meta: &RequestMeta,
        request: SubscribeRequest,
    ) -> RpcResult<SubscriptionStream> {
        let SubscribeRequest {
            path,
            input,
            last_event_id,
        } = request;
        validate_path(&path)?;
        validate_input_size(&input, self.config.max_input_size)?;

        let id = SubscriptionId::new();
        let sub_ctx = SubscriptionContext::new(id, last_event_id);
        let signal = sub_ctx.signal();

        let source = AssertUnwindSafe(self.router.subscribe(ctx, sub_ctx, &path, input))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error(panic)))
            .inspect_err(|error| {
                debug!(
                    request_id = %meta.request_id,
                    path = %path,
                    error_code = %error.code,
                    "Subscription rejected"
                )
            })?;

        let (tx, rx) = mpsc::channel(self.config.channel_buffer.max(1));
        let task = tokio::spawn(forward_events(source, tx, signal.clone(), id));
        self.subscriptions
            .register(ActiveSubscription::new(id, path.clone(), signal.clone()).with_task(task));

        info!(
            request_id = %meta.request_id,
            subscription_id = %id,
            path = %path,
            "Subscription started"
        );
        Ok(SubscriptionStream::new(
            id,
            path,
            rx,
            signal,
            self.subscriptions.clone(),
        ))
    }

    /// Cancel a subscription by id. Returns false if it was not live.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` if `id` is not a subscription id.
    pub fn unsubscribe(&self, id: &str) -> RpcResult<bool> {
        let id = validate_subscription_id(id)?;
        Ok(self.subscriptions.unsubscribe(&id))
    }

    /// Cancel every live subscription and wait for their tasks.
    pub async fn shutdown(&self) -> ShutdownResult {
        self.subscriptions
            .shutdown(self.config.shutdown_timeout)
            .await
    }
}

/// Pump producer events into the transport channel until the producer ends,
/// fails, or the subscription is cancelled.
async fn forward_events(
    source: JsonEventStream,
    tx: mpsc::Sender<RpcResult<Event<serde_json::Value>>>,
    signal: Arc<CancellationSignal>,
    id: SubscriptionId,
) {
    let panic_tx = tx.clone();
    let pump = async move {
        let mut source = source;
        loop {
            let item = tokio::select! {
                biased;
                _ = signal.cancelled() => break,
                item = source.next() => item,
            };
            let Some(item) = item else { break };
            let terminal = item.is_err();
            if tx.send(item).await.is_err() || terminal {
                break;
            }
        }
    };

    if let Err(panic) = AssertUnwindSafe(pump).catch_unwind().await {
        let error = panic_error(panic);
        warn!(subscription_id = %id, cause = ?error.cause, "Subscription producer panicked");
        let _ = panic_tx.send(Err(error)).await;
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> RpcError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RpcError::internal("Handler panicked").with_cause(message)
}
