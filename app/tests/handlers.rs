//! Demo procedures called through the dispatcher, without HTTP.

use nexus_app::build_dispatcher;
use nexus_app::rpc::{AppState, DbService};
use nexus_rpc::batch::{CallRequest, CallResult, RpcRequest};
use nexus_rpc::{Dispatcher, ProcedureType, RequestMeta, RpcConfig, RpcErrorCode};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::time::Duration;

fn dispatcher() -> Dispatcher<nexus_app::rpc::AppContext> {
    build_dispatcher(AppState::new(Duration::from_millis(1)), RpcConfig::default()).unwrap()
}

async fn call(dispatcher: &Dispatcher<nexus_app::rpc::AppContext>, path: &str, input: Value) -> CallResult {
    dispatcher
        .handle(&RequestMeta::new(), RpcRequest::Single(CallRequest::new(path, input)))
        .await
        .unwrap()
        .into_results()
        .remove(0)
}

#[test]
fn test_catalog() {
    let dispatcher = dispatcher();
    let catalog: Vec<_> = dispatcher
        .router()
        .procedures()
        .iter()
        .map(|p| (p.path.as_str(), p.procedure_type))
        .collect();
    assert_eq!(
        catalog,
        vec![
            ("hello", ProcedureType::Query),
            ("teststream", ProcedureType::Subscription),
            ("user.create", ProcedureType::Mutation),
            ("user.delete", ProcedureType::Mutation),
            ("user.getById", ProcedureType::Query),
            ("user.list", ProcedureType::Query),
            ("whoami", ProcedureType::Query),
        ]
    );
}

#[tokio::test]
async fn test_hello_shape() {
    let dispatcher = dispatcher();
    assert_eq!(
        call(&dispatcher, "hello", json!({"text": "world"})).await,
        CallResult::Ok(json!({"greeting": "hello world"}))
    );
}

#[tokio::test]
async fn test_user_list_contains_seed_users() {
    let dispatcher = dispatcher();
    let CallResult::Ok(users) = call(&dispatcher, "user.list", Value::Null).await else {
        panic!("expected users");
    };
    let names: Vec<_> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
}

#[tokio::test]
async fn test_db_service_operations() {
    let db = DbService::new();
    assert_eq!(db.get_user("123").await.unwrap().name, "Carol");
    assert!(db.get_user("999").await.is_none());

    let dave = db.create_user("Dave", "dave@example.com").await.unwrap();
    assert_eq!(dave.id, "124");
    let error = db.create_user("Dave", "Dave@Example.com").await.unwrap_err();
    assert_eq!(error.code, RpcErrorCode::Conflict);

    assert!(db.delete_user("124").await);
    assert!(!db.delete_user("124").await);
    assert_eq!(db.list_users().await.len(), 3);
}

#[tokio::test]
async fn test_db_service_concurrent_writers() {
    let db = DbService::new();
    let creates = (0..20).map(|i| {
        let db = db.clone();
        tokio::spawn(async move {
            db.create_user("user", &format!("u{}@example.com", i)).await
        })
    });
    let created = futures::future::join_all(creates).await;
    assert!(created.into_iter().all(|r| r.unwrap().is_ok()));

    let users = db.list_users().await;
    assert_eq!(users.len(), 23);
    let mut ids: Vec<_> = users.iter().map(|u| u.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 23);
}

proptest! {
    /// Strings without an `@` are never accepted as email addresses.
    #[test]
    fn prop_create_rejects_addresses_without_at(name in "[A-Za-z]{1,20}", email in "[a-z.]{0,30}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(async {
            call(&dispatcher(), "user.create", json!({"name": name, "email": email})).await
        });
        let CallResult::Error(error) = result else {
            return Err(TestCaseError::fail("create accepted an invalid email"));
        };
        prop_assert_eq!(error.code, RpcErrorCode::ValidationError);
        prop_assert_eq!(&error.details.unwrap()["fields"][0]["field"], "email");
    }
}
