//! Consumer side of a running subscription

use super::{CancellationSignal, Event, SubscriptionEvent, SubscriptionId, SubscriptionManager};
use crate::{RpcError, RpcResult};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::mpsc;

/// Ordered stream of messages for one subscription.
///
/// Yields `Data` messages in emission order, then exactly one terminal
/// `Completed` or `Error`. A cancelled subscription terminates with a
/// `CANCELLED` error and yields no further data. Dropping the stream cancels
/// the producer and removes the subscription from its manager.
pub struct SubscriptionStream {
    id: SubscriptionId,
    path: String,
    rx: mpsc::Receiver<RpcResult<Event<serde_json::Value>>>,
    signal: Arc<CancellationSignal>,
    manager: Arc<SubscriptionManager>,
    finished: bool,
}

impl SubscriptionStream {
    pub(crate) fn new(
        id: SubscriptionId,
        path: String,
        rx: mpsc::Receiver<RpcResult<Event<serde_json::Value>>>,
        signal: Arc<CancellationSignal>,
        manager: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            id,
            path,
            rx,
            signal,
            manager,
            finished: false,
        }
    }

    /// Id under which the subscription is registered
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Procedure path being streamed
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cancel the producer; the next poll yields the terminal `CANCELLED`.
    pub fn cancel(&self) {
        self.signal.cancel();
        self.manager.unsubscribe(&self.id);
    }

    fn finish(&mut self, event: SubscriptionEvent) -> Poll<Option<SubscriptionEvent>> {
        self.finished = true;
        self.rx.close();
        self.manager.unsubscribe(&self.id);
        match &event {
            SubscriptionEvent::Completed => {
                tracing::debug!(subscription_id = %self.id, path = %self.path, "Subscription completed")
            }
            SubscriptionEvent::Error { payload } => tracing::debug!(
                subscription_id = %self.id,
                path = %self.path,
                error_code = %payload.code,
                "Subscription ended with error"
            ),
            SubscriptionEvent::Data { .. } => {}
        }
        Poll::Ready(Some(event))
    }

    fn cancelled_event() -> SubscriptionEvent {
        SubscriptionEvent::error(RpcError::cancelled("Subscription cancelled"))
    }
}

impl Stream for SubscriptionStream {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        if self.signal.is_cancelled() {
            return self.finish(Self::cancelled_event());
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(event))) => {
                Poll::Ready(Some(SubscriptionEvent::data(event)))
            }
            Poll::Ready(Some(Err(error))) => {
                tracing::warn!(
                    subscription_id = %self.id,
                    error_code = %error.code,
                    error = %error.message,
                    cause = ?error.cause,
                    "Subscription producer failed"
                );
                self.finish(SubscriptionEvent::error(error))
            }
            Poll::Ready(None) if self.signal.is_cancelled() => self.finish(Self::cancelled_event()),
            Poll::Ready(None) => self.finish(SubscriptionEvent::Completed),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(subscription_id = %self.id, path = %self.path, "Subscription stream dropped");
        }
        self.signal.cancel();
        self.manager.unsubscribe(&self.id);
    }
}

impl std::fmt::Debug for SubscriptionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("finished", &self.finished)
            .finish()
    }
}
