//! Handler traits and type erasure
//!
//! Query and mutation handlers are async functions
//! `async fn(Context<Ctx>, Input) -> RpcResult<Output>`. Before storage they
//! are wrapped so the stored form takes raw JSON, decodes it into `Input`,
//! runs the input's [`Validate`] rule, and only then calls the handler.

use crate::validation::{FieldError, Validate, validation_error};
use crate::{Context, RpcResult};
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{trace, warn};

/// Boxed handler for type erasure
pub(crate) type BoxedHandler<Ctx> = Arc<
    dyn Fn(
            Context<Ctx>,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = RpcResult<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Trait for handler functions
///
/// Automatically implemented for async functions with the signature:
/// `async fn(Context<Ctx>, Input) -> RpcResult<Output>`
pub trait Handler<Ctx, Input, Output>: Clone + Send + Sync + 'static
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Validate + Send + 'static,
    Output: Serialize + Send + 'static,
{
    /// The future type returned by the handler
    type Future: Future<Output = RpcResult<Output>> + Send;

    /// Call the handler with context and input
    fn call(&self, ctx: Context<Ctx>, input: Input) -> Self::Future;
}

impl<Ctx, Input, Output, F, Fut> Handler<Ctx, Input, Output> for F
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Validate + Send + 'static,
    Output: Serialize + Send + 'static,
    F: Fn(Context<Ctx>, Input) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Output>> + Send + 'static,
{
    type Future = Fut;

    fn call(&self, ctx: Context<Ctx>, input: Input) -> Self::Future {
        (self)(ctx, input)
    }
}

/// Decode a JSON payload into a procedure's input type and run its rule.
///
/// Both a decode failure and a rule failure yield `VALIDATION_ERROR`.
pub(crate) fn decode_input<Input>(value: serde_json::Value) -> RpcResult<Input>
where
    Input: DeserializeOwned + Validate,
{
    let input: Input = serde_json::from_value(value).map_err(|e| {
        trace!(error = %e, "Input deserialization failed");
        validation_error(vec![FieldError::decode(e.to_string())])
    })?;

    let result = input.validate();
    if !result.is_valid() {
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        warn!(
            error_count = result.errors.len(),
            fields = ?fields,
            "Handler input validation failed"
        );
        return Err(validation_error(result.errors));
    }

    Ok(input)
}

/// Convert a handler into its stored, validating form
pub(crate) fn into_boxed<Ctx, Input, Output, H>(handler: H) -> BoxedHandler<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Validate + Send + 'static,
    Output: Serialize + Send + 'static,
    H: Handler<Ctx, Input, Output>,
{
    Arc::new(move |ctx, input_value| {
        let handler = handler.clone();
        Box::pin(async move {
            let input: Input = decode_input(input_value)?;

            let output = handler.call(ctx, input).await.inspect_err(|e| {
                warn!(error_code = %e.code, error_message = %e.message, "Handler execution failed");
            })?;

            let output_value = serde_json::to_value(output).map_err(|e| {
                warn!(error = %e, "Handler output serialization failed");
                e
            })?;
            Ok(output_value)
        })
    })
}
