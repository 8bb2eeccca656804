//! HTTP transport
//!
//! Mounts a [`Dispatcher`] on an axum router under `RpcConfig::base_path`:
//!
//! | method | path                 | body / query                 |
//! |--------|----------------------|------------------------------|
//! | POST   | `{base}`             | one call or a batch          |
//! | GET    | `{base}/{path}`      | `?input=<json>`, query only  |
//! | POST   | `{base}/subscribe`   | `{path, input, lastEventId?}`|
//! | POST   | `{base}/unsubscribe` | `{id}`                       |
//! | GET    | `{base}/procedures`  |                              |
//!
//! Well-formed calls always answer 200 with errors in-band, including a
//! call whose input exceeds `max_input_size`. The whole request is
//! rejected with 400 for an unparseable envelope or an oversized batch,
//! 413 for a body over [`RpcConfig::max_body_size`](crate::RpcConfig::max_body_size)
//! and 500 when the context factory fails.
//!
//! Subscriptions answer with `text/event-stream`: one `started` event
//! carrying the subscription id, `data` events in emission order, then a
//! terminal `completed` or `error` event.

use crate::batch::{CallRequest, RpcRequest};
use crate::dispatcher::{Dispatcher, SubscribeRequest, UnsubscribeRequest};
use crate::subscription::SubscriptionEvent;
use crate::{ProcedureType, RequestMeta, RpcError, context::REQUEST_ID_HEADER};
use axum::{
    Json,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State, rejection::BytesRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Build the axum router serving `dispatcher`.
///
/// The returned router has its state applied and can be nested or merged
/// into a larger application.
pub fn router<Ctx>(dispatcher: Dispatcher<Ctx>) -> axum::Router
where
    Ctx: Clone + Send + Sync + 'static,
{
    let base = dispatcher.config().base_path.clone();
    let body_limit = dispatcher.config().max_body_size();

    axum::Router::new()
        .route(&base, post(call_handler::<Ctx>))
        .route(&format!("{base}/subscribe"), post(subscribe_handler::<Ctx>))
        .route(
            &format!("{base}/unsubscribe"),
            post(unsubscribe_handler::<Ctx>),
        )
        .route(&format!("{base}/procedures"), get(procedures_handler::<Ctx>))
        .route(&format!("{base}/{{path}}"), get(query_handler::<Ctx>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Serve `dispatcher` on `listener` until `shutdown` resolves.
///
/// When the signal fires, live subscriptions are cancelled first so their
/// event streams end, then in-flight requests are drained.
pub async fn serve<Ctx, F>(
    listener: TcpListener,
    dispatcher: Dispatcher<Ctx>,
    shutdown: F,
) -> std::io::Result<()>
where
    Ctx: Clone + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(
        address = %addr,
        base_path = %dispatcher.config().base_path,
        procedures = dispatcher.router().len(),
        "RPC server listening"
    );

    let app = router(dispatcher.clone());
    let signal = async move {
        shutdown.await;
        let result = dispatcher.shutdown().await;
        info!(
            active_subscriptions = result.active_subscriptions,
            cancelled = result.cancelled_count,
            completed_within_timeout = result.completed_within_timeout,
            duration_ms = result.duration_ms,
            "Subscriptions stopped"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await?;

    info!("RPC server stopped");
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct QueryParams {
    input: Option<String>,
}

async fn call_handler<Ctx>(
    State(dispatcher): State<Dispatcher<Ctx>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response
where
    Ctx: Clone + Send + Sync + 'static,
{
    let meta = request_meta(&headers);
    let request: RpcRequest = match parse_body(body, dispatcher.config().max_body_size()) {
        Ok(request) => request,
        Err(error) => return error_response(error, &meta),
    };

    debug!(request_id = %meta.request_id, calls = request.len(), "RPC request received");
    match dispatcher.handle(&meta, request).await {
        Ok(response) => json_response(StatusCode::OK, &response, &meta),
        Err(error) => error_response(error, &meta),
    }
}

async fn query_handler<Ctx>(
    State(dispatcher): State<Dispatcher<Ctx>>,
    Path(path): Path<String>,
    Query(params): Query<QueryParams>,
    headers: HeaderMap,
) -> Response
where
    Ctx: Clone + Send + Sync + 'static,
{
    let meta = request_meta(&headers);
    let input = match params.input.as_deref().map(serde_json::from_str) {
        None => serde_json::Value::Null,
        Some(Ok(input)) => input,
        Some(Err(e)) => {
            return error_response(
                RpcError::bad_request("Query parameter 'input' is not valid JSON")
                    .with_details(serde_json::json!({ "reason": e.to_string() })),
                &meta,
            );
        }
    };

    // Mutations and subscriptions are refused in-band without running the
    // context factory. Unknown paths fall through to the dispatcher, which
    // builds the context once and then reports NOT_FOUND.
    let request = match dispatcher.router().resolve(&path) {
        Ok(endpoint) if endpoint.procedure_type() != ProcedureType::Query => {
            let error = RpcError::bad_request(format!(
                "'{}' is a {}; only queries may be called with GET",
                path,
                endpoint.procedure_type()
            ));
            return json_response(
                StatusCode::OK,
                &crate::batch::CallResult::from_result(Err(error)),
                &meta,
            );
        }
        _ => RpcRequest::Single(CallRequest::new(path, input)),
    };

    match dispatcher.handle(&meta, request).await {
        Ok(response) => json_response(StatusCode::OK, &response, &meta),
        Err(error) => error_response(error, &meta),
    }
}

async fn subscribe_handler<Ctx>(
    State(dispatcher): State<Dispatcher<Ctx>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response
where
    Ctx: Clone + Send + Sync + 'static,
{
    let meta = request_meta(&headers);
    let request: SubscribeRequest = match parse_body(body, dispatcher.config().max_body_size()) {
        Ok(request) => request,
        Err(error) => return error_response(error, &meta),
    };

    let ctx = match dispatcher.create_context(&meta).await {
        Ok(ctx) => ctx,
        Err(error) => return error_response(error, &meta),
    };

    let keep_alive = KeepAlive::new().interval(dispatcher.config().keep_alive);
    let response = match dispatcher.subscribe_with(ctx, &meta, request).await {
        Ok(stream) => {
            let started = SseEvent::default()
                .event("started")
                .data(stream.id().to_string());
            let events = futures::stream::once(async move { started })
                .chain(stream.map(sse_event))
                .map(Ok::<_, Infallible>);
            Sse::new(events).keep_alive(keep_alive).into_response()
        }
        Err(error) => {
            let terminal = sse_event(SubscriptionEvent::error(error));
            Sse::new(futures::stream::iter([Ok::<_, Infallible>(terminal)]))
                .keep_alive(keep_alive)
                .into_response()
        }
    };
    with_request_id(response, &meta)
}

async fn unsubscribe_handler<Ctx>(
    State(dispatcher): State<Dispatcher<Ctx>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response
where
    Ctx: Clone + Send + Sync + 'static,
{
    let meta = request_meta(&headers);
    let request: UnsubscribeRequest = match parse_body(body, dispatcher.config().max_body_size()) {
        Ok(request) => request,
        Err(error) => return error_response(error, &meta),
    };

    match dispatcher.unsubscribe(&request.id) {
        Ok(found) => {
            debug!(request_id = %meta.request_id, subscription_id = %request.id, found, "Unsubscribe");
            json_response(StatusCode::OK, &serde_json::json!({ "ok": found }), &meta)
        }
        Err(error) => error_response(error, &meta),
    }
}

async fn procedures_handler<Ctx>(
    State(dispatcher): State<Dispatcher<Ctx>>,
    headers: HeaderMap,
) -> Response
where
    Ctx: Clone + Send + Sync + 'static,
{
    let meta = request_meta(&headers);
    json_response(StatusCode::OK, dispatcher.router().procedures(), &meta)
}

// =============================================================================
// Helpers
// =============================================================================

/// Collect request headers; values that are not visible ASCII are skipped.
pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    RequestMeta::from_headers(headers.iter().filter_map(|(name, value)| {
        value
            .to_str()
            .ok()
            .map(|value| (name.as_str(), value.to_string()))
    }))
}

fn parse_body<T: DeserializeOwned>(
    body: Result<Bytes, BytesRejection>,
    max_size: usize,
) -> Result<T, RpcError> {
    let bytes = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RpcError::payload_too_large(format!(
                "Request body exceeds maximum size of {} bytes",
                max_size
            ))
        } else {
            RpcError::bad_request(rejection.body_text())
        }
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        debug!(error = %e, "Malformed request body");
        RpcError::bad_request("Malformed request body")
            .with_details(serde_json::json!({ "reason": e.to_string() }))
    })
}

fn sse_event(event: SubscriptionEvent) -> SseEvent {
    match event {
        SubscriptionEvent::Data { payload } => {
            let mut sse = SseEvent::default()
                .event("data")
                .data(payload.data.to_string());
            if let Some(id) = payload.id.filter(|id| !id.contains(['\n', '\r'])) {
                sse = sse.id(id);
            }
            if let Some(retry) = payload.retry {
                sse = sse.retry(Duration::from_millis(retry));
            }
            sse
        }
        SubscriptionEvent::Error { payload } => SseEvent::default()
            .event("error")
            .data(serde_json::to_string(&payload).unwrap_or_default()),
        SubscriptionEvent::Completed => SseEvent::default().event("completed").data(""),
    }
}

fn json_response<T: serde::Serialize + ?Sized>(
    status: StatusCode,
    body: &T,
    meta: &RequestMeta,
) -> Response {
    with_request_id((status, Json(body)).into_response(), meta)
}

/// Reject a whole request; the status follows the error code.
fn error_response(error: RpcError, meta: &RequestMeta) -> Response {
    let status = StatusCode::from_u16(error.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(
            request_id = %meta.request_id,
            error_code = %error.code,
            cause = ?error.cause,
            "Request rejected"
        );
    } else {
        debug!(request_id = %meta.request_id, error_code = %error.code, "Request rejected");
    }
    json_response(status, &error.sanitize(), meta)
}

fn with_request_id(mut response: Response, meta: &RequestMeta) -> Response {
    if let Ok(value) = HeaderValue::from_str(&meta.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
