//! Subscription streaming
//!
//! A subscription handler starts a producer (usually a spawned task) that
//! pushes events into a bounded channel and returns the receiving end:
//!
//! ```rust,ignore
//! async fn ticks(
//!     _ctx: Context<AppContext>,
//!     sub_ctx: SubscriptionContext,
//!     input: TickInput,
//! ) -> SubscriptionResult<u64> {
//!     let (tx, rx) = event_channel(32);
//!     tokio::spawn(async move {
//!         for i in 0..input.count {
//!             if sub_ctx.is_cancelled() || tx.emit(i).await.is_err() {
//!                 break;
//!             }
//!         }
//!     });
//!     Ok(rx)
//! }
//! ```
//!
//! The dispatcher forwards the producer's events into a
//! [`SubscriptionStream`] and tracks the forwarding task in a
//! [`SubscriptionManager`] so it can be cancelled by id.

mod context;
mod event;
mod handler;
mod id;
mod manager;
mod stream;

pub use context::{CancellationSignal, SubscriptionContext};
pub use event::{Event, SubscriptionEvent};
pub use handler::{
    EventSender, EventStream, JsonEventStream, StreamClosed, SubscriptionHandler,
    SubscriptionResult, event_channel,
};
pub use id::{ParseError, SubscriptionId};
pub use manager::{ActiveSubscription, ShutdownResult, SubscriptionManager};
pub use stream::SubscriptionStream;

pub(crate) use handler::{BoxedSubscriptionHandler, into_boxed_subscription};
