//! Stream link
//!
//! Each subscription opens one `text/event-stream` response. The first
//! event announces the subscription id; `data` events follow in order until
//! a terminal `completed` or `error` event.

use super::ClientError;
use super::batch::rejection;
use crate::dispatcher::{SubscribeRequest, UnsubscribeRequest};
use crate::{RpcError, RpcErrorCode, SubscriptionId};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::{debug, trace};

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub(crate) event: String,
    pub(crate) data: String,
    pub(crate) id: Option<String>,
}

/// Incremental `text/event-stream` decoder.
///
/// Accepts arbitrary chunk boundaries, `\n` or `\r\n` line endings, and
/// skips comment lines (keep-alives).
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    /// Feed one chunk, returning every event it completes
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if self.event.is_none() && self.data.is_empty() {
                return None;
            }
            return Some(SseFrame {
                event: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: std::mem::take(&mut self.data).join("\n"),
                id: self.id.take(),
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

type FrameStream = BoxStream<'static, Result<SseFrame, ClientError>>;

fn frames(response: reqwest::Response) -> FrameStream {
    let mut body = response.bytes_stream();
    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(&bytes) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(ClientError::from(e));
                    break;
                }
            }
        }
    })
}

/// Parse the payload of an `error` event
fn decode_error(data: &str) -> RpcError {
    serde_json::from_str(data).unwrap_or_else(|_| RpcError::internal(RpcError::INTERNAL_MESSAGE))
}

/// Sends the best-effort unsubscribe for a handle
#[derive(Debug, Clone)]
pub(crate) struct Unsubscriber {
    pub(crate) http: reqwest::Client,
    pub(crate) url: String,
}

impl Unsubscriber {
    pub(crate) async fn send(&self, id: &SubscriptionId) -> Result<bool, ClientError> {
        let response = self
            .http
            .post(&self.url)
            .json(&UnsubscribeRequest { id: id.to_string() })
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        Ok(value.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false))
    }

    fn spawn(&self, id: SubscriptionId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let this = self.clone();
        runtime.spawn(async move {
            if let Err(error) = this.send(&id).await {
                debug!(subscription_id = %id, error = %error, "Unsubscribe failed");
            }
        });
    }
}

/// Open a subscription and wait for its `started` event.
pub(crate) async fn open<T>(
    http: &reqwest::Client,
    url: &str,
    request: &SubscribeRequest,
    unsubscriber: Unsubscriber,
) -> Result<SubscriptionHandle<T>, ClientError> {
    let response = http
        .post(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(request)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await?;
        return Err(rejection(status, &body));
    }

    let mut frames = frames(response);
    let id = match frames.next().await {
        Some(Ok(frame)) if frame.event == "started" => SubscriptionId::parse_lenient(&frame.data)
            .map_err(|e| ClientError::Protocol(format!("invalid subscription id: {}", e)))?,
        Some(Ok(frame)) if frame.event == "error" => {
            return Err(ClientError::Rpc(decode_error(&frame.data)));
        }
        Some(Ok(frame)) => {
            return Err(ClientError::Protocol(format!(
                "expected 'started' event, got '{}'",
                frame.event
            )));
        }
        Some(Err(error)) => return Err(error),
        None => {
            return Err(ClientError::Protocol(
                "stream closed before it started".to_string(),
            ));
        }
    };

    debug!(subscription_id = %id, path = %request.path, "Subscription opened");
    Ok(SubscriptionHandle {
        id,
        path: request.path.clone(),
        frames,
        last_event_id: request.last_event_id.clone(),
        unsubscriber,
        done: false,
        _output: PhantomData,
    })
}

/// Live subscription on the client side.
///
/// Yields each pushed value in order and ends after the server's terminal
/// message. A server-side failure is yielded once as `Err` before the end;
/// a `CANCELLED` termination ends the stream without an error.
///
/// [`cancel`](Self::cancel), or dropping the handle, stops delivery
/// immediately, closes the connection and asks the server to unsubscribe.
pub struct SubscriptionHandle<T> {
    id: SubscriptionId,
    path: String,
    frames: FrameStream,
    last_event_id: Option<String>,
    unsubscriber: Unsubscriber,
    done: bool,
    _output: PhantomData<fn() -> T>,
}

impl<T> SubscriptionHandle<T> {
    /// Id announced by the server
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Procedure path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Id of the last event received, for resuming with `lastEventId`
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// True once the stream has ended or been cancelled
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Stop delivery and release the connection. Idempotent.
    pub fn cancel(&mut self) {
        if self.done {
            return;
        }
        trace!(subscription_id = %self.id, "Cancelling subscription");
        self.finish();
        self.unsubscriber.spawn(self.id);
    }

    fn finish(&mut self) {
        self.done = true;
        self.frames = futures::stream::empty().boxed();
    }
}

impl<T: DeserializeOwned> Stream for SubscriptionHandle<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }
            let frame = match ready!(self.frames.poll_next_unpin(cx)) {
                Some(Ok(frame)) => frame,
                Some(Err(error)) => {
                    self.finish();
                    return Poll::Ready(Some(Err(error)));
                }
                None => {
                    self.finish();
                    return Poll::Ready(Some(Err(ClientError::Protocol(
                        "stream ended without a terminal event".to_string(),
                    ))));
                }
            };

            match frame.event.as_str() {
                "data" => {
                    if frame.id.is_some() {
                        self.last_event_id = frame.id;
                    }
                    return Poll::Ready(Some(
                        serde_json::from_str(&frame.data).map_err(ClientError::from),
                    ));
                }
                "completed" => {
                    self.finish();
                    return Poll::Ready(None);
                }
                "error" => {
                    self.finish();
                    let error = decode_error(&frame.data);
                    if error.code == RpcErrorCode::Cancelled {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Err(ClientError::Rpc(error))));
                }
                _ => continue,
            }
        }
    }
}

impl<T> Drop for SubscriptionHandle<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T> std::fmt::Debug for SubscriptionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("last_event_id", &self.last_event_id)
            .field("done", &self.done)
            .finish()
    }
}
