//! RPC Handlers
//!
//! Define your handlers here and register them in `create_router()`.

use super::*;
use async_stream::stream;
use nexus_rpc::{
    Event, LogConfig, SubscriptionContext, SubscriptionResult, event_channel, logging_middleware,
};
use std::pin::pin;
use tokio_stream::StreamExt;
use tracing::debug;

/// Number of messages `teststream` emits before completing
pub const TESTSTREAM_MESSAGES: usize = 5;

// =============================================================================
// Router
// =============================================================================

/// Create the application router
pub fn create_router() -> Router<AppContext> {
    Router::new()
        .middleware_fn(logging_middleware(LogConfig::default()))
        .query("hello", hello)
        .query("whoami", whoami)
        .subscription("teststream", teststream)
        .merge("user", user_router())
}

/// User sub-router
fn user_router() -> Router<AppContext> {
    Router::new()
        .query("getById", get_user)
        .query("list", list_users)
        .mutation("create", create_user)
        .mutation("delete", delete_user)
}

// =============================================================================
// Root Handlers
// =============================================================================

async fn hello(_ctx: Context<AppContext>, input: TextInput) -> RpcResult<Greeting> {
    Ok(Greeting {
        greeting: format!("hello {}", input.text),
    })
}

async fn whoami(ctx: Context<AppContext>, _: NoInput) -> RpcResult<WhoAmI> {
    let session = ctx
        .auth
        .as_ref()
        .ok_or_else(|| RpcError::unauthorized("Not authenticated"))?;
    Ok(WhoAmI {
        user: session.user.clone(),
        request_id: ctx.request_id.clone(),
    })
}

// =============================================================================
// User Handlers
// =============================================================================

async fn get_user(ctx: Context<AppContext>, input: UserIdInput) -> RpcResult<User> {
    ctx.db
        .get_user(&input.id)
        .await
        .ok_or_else(|| RpcError::not_found(format!("User {} not found", input.id)))
}

async fn list_users(ctx: Context<AppContext>, _: NoInput) -> RpcResult<Vec<User>> {
    Ok(ctx.db.list_users().await)
}

async fn create_user(ctx: Context<AppContext>, input: CreateUserInput) -> RpcResult<User> {
    ctx.db.create_user(input.name.trim(), &input.email).await
}

async fn delete_user(ctx: Context<AppContext>, input: UserIdInput) -> RpcResult<Deleted> {
    if ctx.auth.is_none() {
        return Err(RpcError::unauthorized("Deleting users requires a session"));
    }
    if !ctx.db.delete_user(&input.id).await {
        return Err(RpcError::not_found(format!("User {} not found", input.id)));
    }
    Ok(Deleted {
        id: input.id,
        deleted: true,
    })
}

// =============================================================================
// Subscription Handlers
// =============================================================================

/// Emits `"hello <text> <i>"` for `i` in `0..5`, one per `stream_interval`.
///
/// Resumes after `last_event_id` when the client supplies one.
async fn teststream(
    ctx: Context<AppContext>,
    sub_ctx: SubscriptionContext,
    input: TextInput,
) -> SubscriptionResult<String> {
    let (tx, rx) = event_channel(TESTSTREAM_MESSAGES);
    let interval = ctx.stream_interval;
    let start = sub_ctx
        .last_event_id
        .as_deref()
        .and_then(|id| id.parse::<usize>().ok())
        // An id past the end (or at usize::MAX) leaves nothing to send.
        .map_or(0, |last| last.saturating_add(1));

    tokio::spawn(async move {
        let messages = stream! {
            for i in start..TESTSTREAM_MESSAGES {
                if i > start {
                    tokio::time::sleep(interval).await;
                }
                yield Event::with_id(format!("hello {} {}", input.text, i), i.to_string());
            }
        };

        let mut messages = pin!(messages);
        loop {
            let event = tokio::select! {
                _ = sub_ctx.cancelled() => {
                    debug!(subscription_id = %sub_ctx.subscription_id, "teststream cancelled");
                    break;
                }
                event = messages.next() => event,
            };
            let Some(event) = event else { break };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
