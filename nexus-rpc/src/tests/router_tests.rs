//! Router registry tests
//!
//! - registration errors surface at compile time
//! - dotted paths resolve through merged routers
//! - input rules run before the handler
//! - middleware scoping across merges

use super::fixtures::*;
use crate::prelude::*;
use crate::{CompiledRouter, RegistryError, RpcErrorCode};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn ctx() -> Context<TestContext> {
    Context::new(TestContext {
        request_id: "req-1".to_string(),
        user: None,
    })
}

fn compiled() -> CompiledRouter<TestContext> {
    test_router().compile().expect("router compiles")
}

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_duplicate_registration_is_fatal() {
    let result = Router::<TestContext>::new()
        .query("hello", hello)
        .mutation("hello", echo)
        .compile();

    assert!(matches!(
        result,
        Err(RegistryError::DuplicatePath { ref path }) if path == "hello"
    ));
}

#[test]
fn test_duplicate_through_merge_is_fatal() {
    let result = Router::<TestContext>::new()
        .query("user.getById", get_by_id)
        .merge("user", user_router())
        .compile();

    assert!(matches!(
        result,
        Err(RegistryError::DuplicatePath { ref path }) if path == "user.getById"
    ));
}

#[test]
fn test_leaf_namespace_conflict_is_fatal() {
    let result = Router::<TestContext>::new()
        .query("user", hello)
        .merge("user", user_router())
        .compile();
    assert!(matches!(
        result,
        Err(RegistryError::LeafNamespaceConflict { .. })
    ));

    let result = Router::<TestContext>::new()
        .merge("user", user_router())
        .query("user", hello)
        .compile();
    assert!(matches!(
        result,
        Err(RegistryError::LeafNamespaceConflict { ref path }) if path == "user"
    ));
}

#[test]
fn test_malformed_paths_are_rejected() {
    for path in ["", ".hello", "hello.", "a..b", "with space", "dash-ed"] {
        let result = Router::<TestContext>::new().query(path, hello).compile();
        assert!(
            matches!(result, Err(RegistryError::InvalidPath { .. })),
            "path {:?} should be rejected",
            path
        );
    }
}

#[test]
fn test_catalog_is_sorted() {
    let router = compiled();
    let paths: Vec<_> = router.procedures().iter().map(|p| p.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert_eq!(router.len(), 13);

    let teststream = router
        .procedures()
        .iter()
        .find(|p| p.path == "teststream")
        .unwrap();
    assert_eq!(teststream.procedure_type, ProcedureType::Subscription);
    assert_eq!(
        serde_json::to_value(teststream).unwrap(),
        json!({"path": "teststream", "type": "subscription"})
    );
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_merged_path_resolves_and_bare_name_does_not() {
    let router = compiled();

    let endpoint = router.resolve("user.getById").unwrap();
    assert_eq!(endpoint.path(), "user.getById");
    assert_eq!(endpoint.procedure_type(), ProcedureType::Query);

    let error = router.resolve("getById").err().unwrap();
    assert_eq!(error.code, RpcErrorCode::NotFound);
    assert_eq!(error.details, Some(json!({"path": "getById"})));
}

#[test]
fn test_namespace_and_overlong_paths_do_not_resolve() {
    let router = compiled();
    assert_eq!(
        router.resolve("user").err().unwrap().code,
        RpcErrorCode::NotFound
    );
    assert_eq!(
        router.resolve("hello.extra").err().unwrap().code,
        RpcErrorCode::NotFound
    );
    assert_eq!(
        router.resolve("user.getById.x").err().unwrap().code,
        RpcErrorCode::NotFound
    );
}

#[tokio::test]
async fn test_hello_returns_greeting() {
    let result = compiled()
        .call(ctx(), "hello", json!({"text": "world"}), "req-1")
        .await
        .unwrap();
    assert_eq!(result, json!("hello world"));
}

#[tokio::test]
async fn test_call_on_subscription_is_bad_request() {
    let error = compiled()
        .call(ctx(), "teststream", json!({"text": "x"}), "req-1")
        .await
        .unwrap_err();
    assert_eq!(error.code, RpcErrorCode::BadRequest);
}

#[tokio::test]
async fn test_subscribe_on_query_is_bad_request() {
    let sub_ctx = crate::SubscriptionContext::new(crate::SubscriptionId::new(), None);
    let error = compiled()
        .subscribe(ctx(), sub_ctx, "hello", json!({"text": "x"}))
        .await
        .err()
        .unwrap();
    assert_eq!(error.code, RpcErrorCode::BadRequest);
}

// =============================================================================
// Input rules
// =============================================================================

#[tokio::test]
async fn test_invalid_input_never_reaches_handler() {
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let router = Router::<TestContext>::new()
        .query("get", move |_ctx: Context<TestContext>, input: IdInput| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, RpcError>(input.id)
            }
        })
        .compile()
        .unwrap();

    let error = router.call(ctx(), "get", json!({"id": ""}), "r").await.unwrap_err();
    assert_eq!(error.code, RpcErrorCode::ValidationError);
    assert_eq!(error.details.as_ref().unwrap()["fields"][0]["field"], "id");

    let error = router.call(ctx(), "get", json!({"id": 42}), "r").await.unwrap_err();
    assert_eq!(error.code, RpcErrorCode::ValidationError);
    assert_eq!(error.details.as_ref().unwrap()["fields"][0]["code"], "decode");

    let error = router.call(ctx(), "get", Value::Null, "r").await.unwrap_err();
    assert_eq!(error.code, RpcErrorCode::ValidationError);

    assert!(!called.load(Ordering::SeqCst));

    let ok = router.call(ctx(), "get", json!({"id": "7"}), "r").await.unwrap();
    assert_eq!(ok, json!("7"));
    assert!(called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unresolvable_paths_never_invoke_a_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = counting_router(calls.clone()).compile().unwrap();

    for path in UNRESOLVABLE_PATHS {
        let error = router.call(ctx(), path, Value::Null, "r").await.unwrap_err();
        assert_eq!(error.code, RpcErrorCode::NotFound, "call {:?}", path);

        let sub_ctx = crate::SubscriptionContext::new(crate::SubscriptionId::new(), None);
        let error = router
            .subscribe(ctx(), sub_ctx, path, Value::Null)
            .await
            .err()
            .unwrap();
        assert_eq!(error.code, RpcErrorCode::NotFound, "subscribe {:?}", path);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    router.call(ctx(), "user.getById", json!(1), "r").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Middleware
// =============================================================================

#[tokio::test]
async fn test_merged_middleware_is_scoped_to_its_router() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let outer_log = log.clone();
    let inner_log = log.clone();
    let inner = Router::<TestContext>::new()
        .middleware(move |ctx, req: Request, next: Next<TestContext>| {
            let log = inner_log.clone();
            async move {
                log.lock().unwrap().push(format!("inner:{}", req.path));
                next(ctx, req).await
            }
        })
        .query("getById", get_by_id);

    let router = Router::<TestContext>::new()
        .middleware(move |ctx, req: Request, next: Next<TestContext>| {
            let log = outer_log.clone();
            async move {
                log.lock().unwrap().push(format!("outer:{}", req.path));
                next(ctx, req).await
            }
        })
        .query("hello", hello)
        .merge("user", inner)
        .compile()
        .unwrap();

    router
        .call(ctx(), "hello", json!({"text": "a"}), "r")
        .await
        .unwrap();
    router
        .call(ctx(), "user.getById", json!({"id": "1"}), "r")
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "outer:hello".to_string(),
            "outer:user.getById".to_string(),
            "inner:user.getById".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_middleware_sees_request_id() {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    let router = Router::<TestContext>::new()
        .middleware(move |ctx, req: Request, next: Next<TestContext>| {
            let slot = slot.clone();
            async move {
                *slot.lock().unwrap() = Some(req.request_id.clone());
                next(ctx, req).await
            }
        })
        .query("hello", hello)
        .compile()
        .unwrap();

    router
        .call(ctx(), "hello", json!({"text": "a"}), "abc-123")
        .await
        .unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("abc-123"));
}

#[tokio::test]
async fn test_function_middleware_runs_per_call() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let router = Router::<TestContext>::new()
        .middleware_fn(crate::from_fn(move |ctx, req, next: Next<TestContext>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { next(ctx, req).await }
        }))
        .query("hello", hello)
        .compile()
        .unwrap();

    for _ in 0..3 {
        router
            .call(ctx(), "hello", json!({"text": "a"}), "r")
            .await
            .unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Properties
// =============================================================================

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,8}"
}

proptest! {
    /// Every registered path resolves to itself; its bare last segment only
    /// resolves when it was registered at the root as well.
    #[test]
    fn prop_registered_paths_resolve(
        namespace in segment(),
        names in prop::collection::hash_set(segment(), 1..8),
    ) {
        let mut child = Router::<TestContext>::new();
        for name in &names {
            child = child.query(name.clone(), hello);
        }
        let router = Router::<TestContext>::new().merge(namespace.clone(), child).compile().unwrap();

        prop_assert_eq!(router.len(), names.len());
        for name in &names {
            let full = format!("{}.{}", namespace, name);
            prop_assert_eq!(router.resolve(&full).unwrap().path(), full.as_str());
            prop_assert_eq!(router.resolve(name).err().unwrap().code, RpcErrorCode::NotFound);
        }
    }

    /// Registering the same path twice always fails to compile.
    #[test]
    fn prop_duplicates_always_fail(path in "[a-z]{1,6}(\\.[a-z]{1,6}){0,3}") {
        let result = Router::<TestContext>::new()
            .query(path.clone(), hello)
            .query(path.clone(), hello)
            .compile();
        let is_duplicate = matches!(result, Err(RegistryError::DuplicatePath { .. }));
        prop_assert!(is_duplicate);
    }
}
