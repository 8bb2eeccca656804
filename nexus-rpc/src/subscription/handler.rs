//! Subscription handler trait, event channels and type erasure

use super::{Event, SubscriptionContext};
use crate::handler::decode_input;
use crate::validation::Validate;
use crate::{Context, RpcError, RpcResult};
use futures::stream::BoxStream;
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Receiving half of a producer channel
pub type EventStream<T> = mpsc::Receiver<RpcResult<Event<T>>>;

/// Type-erased stream of JSON events produced by a subscription
pub type JsonEventStream = BoxStream<'static, RpcResult<Event<serde_json::Value>>>;

/// Return type for subscription handlers
pub type SubscriptionResult<T> = RpcResult<EventStream<T>>;

/// The receiving side of a subscription went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("subscription stream closed")]
pub struct StreamClosed;

/// Sending half of a producer channel.
///
/// Producers push values with [`send`](Self::send) or [`emit`](Self::emit)
/// and end the stream early with [`fail`](Self::fail). Every method returns
/// `Err(StreamClosed)` once the consumer is gone, which is the signal to stop.
#[derive(Debug)]
pub struct EventSender<T> {
    tx: mpsc::Sender<RpcResult<Event<T>>>,
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send> EventSender<T> {
    /// Push an event, waiting for buffer space
    pub async fn send(&self, event: Event<T>) -> Result<(), StreamClosed> {
        self.tx.send(Ok(event)).await.map_err(|_| StreamClosed)
    }

    /// Push a bare value
    pub async fn emit(&self, data: T) -> Result<(), StreamClosed> {
        self.send(Event::new(data)).await
    }

    /// Terminate the stream with an error
    pub async fn fail(&self, error: RpcError) -> Result<(), StreamClosed> {
        self.tx.send(Err(error)).await.map_err(|_| StreamClosed)
    }

    /// True once the consumer dropped the stream
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded producer channel.
///
/// ```rust,ignore
/// let (tx, rx) = event_channel(32);
/// tokio::spawn(async move {
///     for i in 0..5 {
///         if tx.emit(i).await.is_err() {
///             break;
///         }
///     }
/// });
/// Ok(rx)
/// ```
pub fn event_channel<T>(buffer: usize) -> (EventSender<T>, EventStream<T>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (EventSender { tx }, rx)
}

/// Boxed subscription handler for type erasure
pub(crate) type BoxedSubscriptionHandler<Ctx> = Arc<
    dyn Fn(
            Context<Ctx>,
            SubscriptionContext,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = RpcResult<JsonEventStream>> + Send>>
        + Send
        + Sync,
>;

/// Trait for subscription handler functions
///
/// Automatically implemented for async functions with the signature:
/// `async fn(Context<Ctx>, SubscriptionContext, Input) -> SubscriptionResult<Output>`
pub trait SubscriptionHandler<Ctx, Input, Output>: Clone + Send + Sync + 'static
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Validate + Send + 'static,
    Output: Serialize + Send + 'static,
{
    /// The future type returned by the handler
    type Future: Future<Output = SubscriptionResult<Output>> + Send;

    /// Start the producer and hand back its stream
    fn call(&self, ctx: Context<Ctx>, sub_ctx: SubscriptionContext, input: Input) -> Self::Future;
}

impl<Ctx, Input, Output, F, Fut> SubscriptionHandler<Ctx, Input, Output> for F
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Validate + Send + 'static,
    Output: Serialize + Send + 'static,
    F: Fn(Context<Ctx>, SubscriptionContext, Input) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = SubscriptionResult<Output>> + Send + 'static,
{
    type Future = Fut;

    fn call(&self, ctx: Context<Ctx>, sub_ctx: SubscriptionContext, input: Input) -> Self::Future {
        (self)(ctx, sub_ctx, input)
    }
}

/// Convert a subscription handler into its stored form.
///
/// The stored form decodes and validates the input, starts the producer and
/// maps its typed events to JSON. A payload that fails to serialize ends the
/// stream with `INTERNAL`.
pub(crate) fn into_boxed_subscription<Ctx, Input, Output, H>(
    handler: H,
) -> BoxedSubscriptionHandler<Ctx>
where
    Ctx: Clone + Send + Sync + 'static,
    Input: DeserializeOwned + Validate + Send + 'static,
    Output: Serialize + Send + 'static,
    H: SubscriptionHandler<Ctx, Input, Output>,
{
    Arc::new(move |ctx, sub_ctx, input_value| {
        let handler = handler.clone();
        Box::pin(async move {
            let input: Input = decode_input(input_value)?;
            let rx = handler.call(ctx, sub_ctx, input).await?;

            let json = futures::stream::unfold(rx, |mut rx| async move {
                let item = rx.recv().await?;
                let item = item.and_then(|event| {
                    let data = serde_json::to_value(&event.data).map_err(|e| {
                        tracing::error!(error = %e, "Failed to serialize subscription event data");
                        RpcError::from(e)
                    })?;
                    Ok(Event {
                        data,
                        id: event.id,
                        retry: event.retry,
                    })
                });
                Some((item, rx))
            });

            Ok(Box::pin(json) as JsonEventStream)
        })
    })
}
