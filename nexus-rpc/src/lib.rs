#![warn(missing_docs)]
//! # nexus-rpc
//!
//! Type-safe RPC over HTTP with batched calls and streaming subscriptions.
//!
//! ## Overview
//!
//! - **Router registry** mapping dotted paths (`user.getById`) to queries,
//!   mutations and subscriptions
//! - **Input validation** through `serde` decoding plus the [`Validate`] trait
//! - **Context factory** invoked once per incoming request
//! - **Dispatcher** running batched calls concurrently with per-slot results
//! - **Subscriptions** streamed as server-sent events with cancellation
//! - **Client** that coalesces calls into batches and streams subscriptions
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Client                            │
//! │  ┌──────────────┐   ┌────────────┐   ┌───────────────┐   │
//! │  │ scope/call   │──▶│ Batch link │   │ Stream link   │   │
//! │  └──────────────┘   └─────┬──────┘   └──────┬────────┘   │
//! └───────────────────────────┼─────────────────┼────────────┘
//!                   POST {base}│      POST {base}/subscribe (SSE)
//!                             ▼                 ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  server (axum) ─▶ Dispatcher ─▶ ContextFactory (once)    │
//! │                        │                                 │
//! │                        ▼                                 │
//! │  CompiledRouter ─▶ middleware ─▶ decode + Validate ─▶ handler
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nexus_rpc::prelude::*;
//!
//! #[derive(Clone)]
//! struct AppContext { request_id: String }
//!
//! #[derive(Deserialize)]
//! struct HelloInput { text: String }
//! impl Validate for HelloInput {}
//!
//! async fn hello(_ctx: Context<AppContext>, input: HelloInput) -> RpcResult<String> {
//!     Ok(format!("hello {}", input.text))
//! }
//!
//! let router = Router::new().query("hello", hello).compile()?;
//! let dispatcher = Dispatcher::new(router, |meta: RequestMeta| async move {
//!     Ok(AppContext { request_id: meta.request_id })
//! });
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! nexus_rpc::server::serve(listener, dispatcher, shutdown_signal()).await?;
//! ```
//!
//! ## Error Handling
//!
//! Handlers return [`RpcResult`]. Errors cross the wire as
//! `{code, message, details?}`; `INTERNAL` errors are sanitized to a generic
//! message before they leave the process.
//!
//! ```rust,ignore
//! RpcError::not_found("User not found")
//! RpcError::validation("Invalid input")
//!     .with_details(json!({ "field": "email" }))
//! ```

pub mod batch;
pub mod client;
mod config;
mod context;
pub mod dispatcher;
mod error;
mod handler;
pub mod logging;
pub mod middleware;
mod procedure;
mod router;
pub mod server;
pub mod subscription;
pub mod types;
pub mod validation;

#[cfg(test)]
mod tests;

pub use batch::{BatchConfig, CallRequest, CallResult, RpcRequest, RpcResponse};
pub use config::{CALL_ENVELOPE_OVERHEAD, ConfigValidationError, RpcConfig};
pub use context::{
    Context, ContextFactory, REQUEST_ID_HEADER, RequestMeta, SharedContextFactory, StaticContext,
    generate_request_id,
};
pub use dispatcher::{Dispatcher, SubscribeRequest, UnsubscribeRequest};
pub use error::{RegistryError, RpcError, RpcErrorCode, RpcResult};
pub use handler::Handler;
pub use logging::{LogConfig, logging_middleware, redact_value};
pub use middleware::{MiddlewareFn, Next, Request, Response, from_fn};
pub use procedure::{ProcedureMeta, ProcedureType};
pub use router::{CompiledRouter, Endpoint, Router};
pub use subscription::{
    CancellationSignal, Event, EventSender, EventStream, SubscriptionContext, SubscriptionEvent,
    SubscriptionHandler, SubscriptionId, SubscriptionManager, SubscriptionResult,
    SubscriptionStream, event_channel,
};
pub use types::NoInput;
pub use validation::{FieldError, Validate, ValidationResult, ValidationRules};

/// Prelude for convenient imports
///
/// ```rust,ignore
/// use nexus_rpc::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{Client, ClientConfig, ClientError, Procedure, SubscriptionHandle};
    pub use crate::{
        BatchConfig, Context, ContextFactory, Dispatcher, Event, EventSender, EventStream,
        FieldError, LogConfig, Next, NoInput, ProcedureType, Request, RequestMeta, Response,
        Router, RpcConfig, RpcError, RpcErrorCode, RpcResult, StaticContext,
        SubscriptionContext, SubscriptionResult, Validate, ValidationResult, ValidationRules,
        event_channel, logging_middleware,
    };
    pub use serde::{Deserialize, Serialize};
}
