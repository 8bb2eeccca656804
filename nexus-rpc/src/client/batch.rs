//! Batch link
//!
//! Calls are queued to a single worker task. The worker takes the first
//! queued call, keeps collecting for `batch_window` (or until
//! `max_batch_size` calls or `max_batch_bytes` of serialized calls are
//! waiting), and sends them as one POST. Each caller is answered from its
//! own slot of the positional response.
//!
//! A batch the server refuses as a whole with 400 or 413 has not run any
//! call; its calls are then sent one by one so each gets the answer it
//! would have had alone.

use super::{ClientConfig, ClientError};
use crate::batch::{CallRequest, RpcRequest, RpcResponse};
use crate::{RpcError, RpcErrorCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

type Reply = oneshot::Sender<Result<Value, ClientError>>;

struct PendingCall {
    call: CallRequest,
    reply: Reply,
    size: usize,
}

impl PendingCall {
    fn new(call: CallRequest, reply: Reply) -> Self {
        // Array separator included.
        let size = serde_json::to_vec(&call).map_or(0, |bytes| bytes.len()) + 1;
        Self { call, reply, size }
    }
}

#[derive(Clone, Copy)]
struct Limits {
    window: Duration,
    max_calls: usize,
    max_bytes: usize,
    timeout: Duration,
}

/// Handle to the batching worker; the worker stops once every handle is gone.
pub(crate) struct BatchLink {
    tx: mpsc::UnboundedSender<PendingCall>,
}

impl BatchLink {
    /// Spawn the worker on the current Tokio runtime.
    pub(crate) fn spawn(http: reqwest::Client, endpoint: String, config: &ClientConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let limits = Limits {
            window: config.batch_window,
            max_calls: config.max_batch_size.max(1),
            max_bytes: config.max_batch_bytes,
            timeout: config.request_timeout,
        };
        tokio::spawn(run(rx, http, endpoint, limits));
        Self { tx }
    }

    /// Queue one call and wait for its slot.
    pub(crate) async fn call(&self, call: CallRequest) -> Result<Value, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PendingCall::new(call, reply))
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)?
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<PendingCall>,
    http: reqwest::Client,
    endpoint: String,
    limits: Limits,
) {
    // A call that did not fit the previous batch opens the next one.
    let mut carry: Option<PendingCall> = None;

    loop {
        let first = match carry.take() {
            Some(call) => call,
            None => match rx.recv().await {
                Some(call) => call,
                None => break,
            },
        };
        let mut bytes = first.size;
        let mut pending = vec![first];
        let deadline = tokio::time::sleep(limits.window);
        tokio::pin!(deadline);

        while pending.len() < limits.max_calls {
            tokio::select! {
                _ = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(call) if bytes.saturating_add(call.size) > limits.max_bytes => {
                        carry = Some(call);
                        break;
                    }
                    Some(call) => {
                        bytes += call.size;
                        pending.push(call);
                    }
                    None => break,
                },
            }
        }

        trace!(calls = pending.len(), bytes, "Flushing batch");
        tokio::spawn(send_batch(http.clone(), endpoint.clone(), pending, limits.timeout));
    }
    debug!("Batch link stopped");
}

async fn send_batch(
    http: reqwest::Client,
    endpoint: String,
    pending: Vec<PendingCall>,
    timeout: Duration,
) {
    let (mut calls, replies): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .map(|p| (p.call, p.reply))
        .unzip();

    let request = match calls.len() {
        1 => RpcRequest::Single(calls.remove(0)),
        _ => RpcRequest::Batch(calls),
    };
    let expected = request.len();

    match exchange(&http, &endpoint, &request, timeout).await {
        Ok(response) => {
            let results = response.into_results();
            if results.len() != expected {
                let error = ClientError::Protocol(format!(
                    "expected {} results, got {}",
                    expected,
                    results.len()
                ));
                for reply in replies {
                    let _ = reply.send(Err(error.clone()));
                }
                return;
            }
            for (reply, result) in replies.into_iter().zip(results) {
                let _ = reply.send(result.into_result().map_err(ClientError::Rpc));
            }
        }
        Err(error) if expected > 1 && refused_unexecuted(&error) => {
            debug!(error = %error, calls = expected, "Batch refused, sending calls one by one");
            let RpcRequest::Batch(calls) = request else {
                return;
            };
            let singles = calls.into_iter().zip(replies).map(|(call, reply)| {
                let http = &http;
                let endpoint = endpoint.as_str();
                async move {
                    let result = exchange(http, endpoint, &RpcRequest::Single(call), timeout)
                        .await
                        .and_then(single_result);
                    let _ = reply.send(result);
                }
            });
            futures::future::join_all(singles).await;
        }
        Err(error) => {
            debug!(error = %error, calls = expected, "Batch request failed");
            for reply in replies {
                let _ = reply.send(Err(error.clone()));
            }
        }
    }
}

/// Whole-request rejections the server issues before any call runs.
fn refused_unexecuted(error: &ClientError) -> bool {
    matches!(
        error.code(),
        Some(RpcErrorCode::BadRequest | RpcErrorCode::PayloadTooLarge)
    ) || matches!(error, ClientError::Http { status: 400 | 413, .. })
}

fn single_result(response: RpcResponse) -> Result<Value, ClientError> {
    let mut results = response.into_results();
    if results.len() != 1 {
        return Err(ClientError::Protocol(format!(
            "expected 1 result, got {}",
            results.len()
        )));
    }
    results.remove(0).into_result().map_err(ClientError::Rpc)
}

async fn exchange(
    http: &reqwest::Client,
    endpoint: &str,
    request: &RpcRequest,
    timeout: Duration,
) -> Result<RpcResponse, ClientError> {
    let response = http
        .post(endpoint)
        .timeout(timeout)
        .json(request)
        .send()
        .await?;
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        return Ok(serde_json::from_slice(&body)?);
    }
    Err(rejection(status, &body))
}

/// Error for a request the server rejected as a whole.
pub(crate) fn rejection(status: reqwest::StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<RpcError>(body) {
        Ok(error) => ClientError::Rpc(error),
        Err(_) => ClientError::Http {
            status: status.as_u16(),
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}
