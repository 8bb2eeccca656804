//! Subscription streaming tests
//!
//! - values arrive in emission order followed by one terminal message
//! - cancellation stops delivery and reports `CANCELLED`
//! - dropping a stream releases its registry entry
//! - the context is built once per subscription

use super::fixtures::*;
use crate::prelude::*;
use crate::subscription::{
    ActiveSubscription, CancellationSignal, SubscriptionEvent, SubscriptionManager,
};
use crate::{RpcErrorCode, SubscribeRequest, SubscriptionId};
use futures::StreamExt;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

async fn collect(mut stream: crate::SubscriptionStream) -> Vec<SubscriptionEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

fn data(event: &SubscriptionEvent) -> Option<&Value> {
    match event {
        SubscriptionEvent::Data { payload } => Some(&payload.data),
        _ => None,
    }
}

#[tokio::test]
async fn test_teststream_emits_five_messages_then_completes() {
    let dispatcher = test_dispatcher();
    let stream = dispatcher
        .subscribe(
            &RequestMeta::new(),
            SubscribeRequest::new("teststream", json!({"text": "x"})),
        )
        .await
        .unwrap();

    let events = collect(stream).await;
    let values: Vec<_> = events.iter().filter_map(data).cloned().collect();
    assert_eq!(
        values,
        (0..5).map(|i| json!(format!("hello x {}", i))).collect::<Vec<_>>()
    );
    assert_eq!(events.last(), Some(&SubscriptionEvent::Completed));
    assert_eq!(events.len(), 6);

    let SubscriptionEvent::Data { payload } = &events[2] else {
        panic!("expected data");
    };
    assert_eq!(payload.id.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_stream_is_registered_until_finished() {
    let dispatcher = test_dispatcher();
    let stream = dispatcher
        .subscribe(&RequestMeta::new(), SubscribeRequest::new("ticker", Value::Null))
        .await
        .unwrap();
    let id = stream.id();
    assert!(dispatcher.subscriptions().exists(&id));
    assert_eq!(dispatcher.subscriptions().count(), 1);

    drop(stream);
    assert!(!dispatcher.subscriptions().exists(&id));
    assert_eq!(dispatcher.subscriptions().count(), 0);
}

#[tokio::test]
async fn test_cancel_stops_delivery_with_cancelled() {
    let dispatcher = test_dispatcher();
    let mut stream = dispatcher
        .subscribe(&RequestMeta::new(), SubscribeRequest::new("ticker", Value::Null))
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(data(&first), Some(&json!(0)));

    stream.cancel();
    let terminal = stream.next().await.unwrap();
    let SubscriptionEvent::Error { payload } = terminal else {
        panic!("expected terminal error, got {:?}", terminal);
    };
    assert_eq!(payload.code, RpcErrorCode::Cancelled);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_unsubscribe_by_id_cancels_stream() {
    let dispatcher = test_dispatcher();
    let mut stream = dispatcher
        .subscribe(&RequestMeta::new(), SubscribeRequest::new("ticker", Value::Null))
        .await
        .unwrap();
    stream.next().await.unwrap();

    assert!(dispatcher.unsubscribe(&stream.id().to_string()).unwrap());
    assert!(!dispatcher.unsubscribe(&stream.id().to_string()).unwrap());

    let mut saw_cancelled = false;
    while let Some(event) = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("stream ends after unsubscribe")
    {
        if let SubscriptionEvent::Error { payload } = event {
            assert_eq!(payload.code, RpcErrorCode::Cancelled);
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled);
}

#[tokio::test]
async fn test_unsubscribe_rejects_malformed_id() {
    let dispatcher = test_dispatcher();
    let error = dispatcher.unsubscribe("not-an-id").unwrap_err();
    assert_eq!(error.code, RpcErrorCode::BadRequest);
}

#[tokio::test]
async fn test_producer_failure_is_terminal_error() {
    let dispatcher = test_dispatcher();
    let stream = dispatcher
        .subscribe(&RequestMeta::new(), SubscribeRequest::new("failingStream", Value::Null))
        .await
        .unwrap();

    let events = collect(stream).await;
    assert_eq!(events.len(), 2);
    assert_eq!(data(&events[0]), Some(&json!(1)));
    let SubscriptionEvent::Error { payload } = &events[1] else {
        panic!("expected error");
    };
    assert_eq!(payload.code, RpcErrorCode::Conflict);
    assert_eq!(payload.message, "stream broke");
}

#[tokio::test]
async fn test_subscription_setup_errors() {
    let dispatcher = test_dispatcher();
    let meta = RequestMeta::new();

    let cases = [
        ("missing", Value::Null, RpcErrorCode::NotFound),
        ("hello", json!({"text": "a"}), RpcErrorCode::BadRequest),
        ("teststream", json!({"text": 5}), RpcErrorCode::ValidationError),
        ("rejectingStream", Value::Null, RpcErrorCode::Unauthorized),
    ];
    for (path, input, code) in cases {
        let error = dispatcher
            .subscribe(&meta, SubscribeRequest::new(path, input))
            .await
            .unwrap_err();
        assert_eq!(error.code, code, "path {}", path);
    }
    assert_eq!(dispatcher.subscriptions().count(), 0);
}

#[tokio::test]
async fn test_context_is_built_once_per_subscription() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let router = test_router().compile().unwrap();
    let dispatcher = Dispatcher::new(router, move |meta: RequestMeta| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RpcError>(test_context(&meta))
        }
    });

    let stream = dispatcher
        .subscribe(
            &RequestMeta::new(),
            SubscribeRequest::new("teststream", json!({"text": "x"})),
        )
        .await
        .unwrap();
    assert_eq!(collect(stream).await.len(), 6);
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_live_subscriptions() {
    let dispatcher = test_dispatcher();
    let mut streams = Vec::new();
    for _ in 0..3 {
        streams.push(
            dispatcher
                .subscribe(&RequestMeta::new(), SubscribeRequest::new("ticker", Value::Null))
                .await
                .unwrap(),
        );
    }

    let result = dispatcher.shutdown().await;
    assert_eq!(result.active_subscriptions, 3);
    assert!(result.is_success());
    assert_eq!(dispatcher.subscriptions().count(), 0);

    for stream in streams {
        let events = collect(stream).await;
        let last = events.last().unwrap();
        assert!(
            matches!(last, SubscriptionEvent::Error { payload } if payload.code == RpcErrorCode::Cancelled),
            "expected CANCELLED, got {:?}",
            last
        );
    }
}

#[test]
fn test_subscription_event_wire_shape() {
    let event = SubscriptionEvent::data(Event::with_id(json!("x"), "7"));
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({"type": "data", "payload": {"data": "x", "id": "7"}})
    );
    assert_eq!(
        serde_json::to_value(SubscriptionEvent::Completed).unwrap(),
        json!({"type": "completed"})
    );

    let error = SubscriptionEvent::error(RpcError::internal("secret").with_cause("boom"));
    assert!(error.is_terminal());
    assert_eq!(
        serde_json::to_value(&error).unwrap(),
        json!({"type": "error", "payload": {"code": "INTERNAL", "message": RpcError::INTERNAL_MESSAGE}})
    );
}

#[tokio::test]
async fn test_manager_unsubscribe_cancels_signal() {
    let manager = SubscriptionManager::new();
    let signal = Arc::new(CancellationSignal::new());
    let id = SubscriptionId::new();
    manager.register(ActiveSubscription::new(id, "ticker", signal.clone()));

    assert!(manager.exists(&id));
    assert!(manager.unsubscribe(&id));
    assert!(signal.is_cancelled());
    assert!(!manager.unsubscribe(&id));
}

proptest! {
    /// Ids stay unique and round-trip through their wire form.
    #[test]
    fn prop_subscription_ids_unique(count in 1usize..500) {
        let mut ids = HashSet::new();
        for _ in 0..count {
            let id = SubscriptionId::new();
            let wire = id.to_string();
            prop_assert!(wire.starts_with("sub_"));
            prop_assert_eq!(SubscriptionId::parse(&wire).unwrap(), id);
            prop_assert!(ids.insert(id));
        }
    }

    /// Unsubscribing any subset removes exactly that subset.
    #[test]
    fn prop_manager_cleanup(total in 1usize..30, remove in prop::collection::vec(any::<prop::sample::Index>(), 0..15)) {
        let manager = SubscriptionManager::new();
        let ids: Vec<_> = (0..total)
            .map(|_| {
                let id = SubscriptionId::new();
                manager.register(ActiveSubscription::new(id, "p", Arc::new(CancellationSignal::new())));
                id
            })
            .collect();

        let removed: HashSet<_> = remove.iter().map(|ix| ids[ix.index(total)]).collect();
        for id in &removed {
            manager.unsubscribe(id);
        }
        prop_assert_eq!(manager.count(), total - removed.len());
        for id in &ids {
            prop_assert_eq!(manager.exists(id), !removed.contains(id));
        }
    }
}
