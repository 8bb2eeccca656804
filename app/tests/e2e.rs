//! Demo server driven through the client over a real socket.

use futures::StreamExt;
use nexus_app::build_dispatcher;
use nexus_app::rpc::{AppState, Greeting, TESTSTREAM_MESSAGES, User, WhoAmI};
use nexus_rpc::client::{Client, ClientConfig, ClientError};
use nexus_rpc::{RpcConfig, RpcErrorCode, server};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn start() -> (String, oneshot::Sender<()>) {
    let dispatcher = build_dispatcher(
        AppState::new(Duration::from_millis(20)),
        RpcConfig::default(),
    )
    .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/rpc", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server::serve(listener, dispatcher, async move {
        let _ = rx.await;
    }));
    (url, tx)
}

#[tokio::test]
async fn test_hello() {
    let (url, _stop) = start().await;
    let client = Client::new(&url).unwrap();

    let greeting: Greeting = client.query("hello", json!({"text": "world"})).await.unwrap();
    assert_eq!(greeting.greeting, "hello world");
}

#[tokio::test]
async fn test_teststream_yields_five_ordered_messages() {
    let (url, _stop) = start().await;
    let client = Client::new(&url).unwrap();

    let stream = client
        .subscribe::<_, String>("teststream", json!({"text": "x"}))
        .await
        .unwrap();
    let messages: Vec<String> = stream.map(Result::unwrap).collect().await;

    assert_eq!(messages.len(), TESTSTREAM_MESSAGES);
    assert_eq!(
        messages,
        (0..TESTSTREAM_MESSAGES)
            .map(|i| format!("hello x {}", i))
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_teststream_resumes_after_last_event() {
    let (url, _stop) = start().await;
    let client = Client::new(&url).unwrap();

    let stream = client
        .subscribe_from::<_, String>("teststream", json!({"text": "x"}), "2")
        .await
        .unwrap();
    let messages: Vec<String> = stream.map(Result::unwrap).collect().await;
    assert_eq!(messages, vec!["hello x 3", "hello x 4"]);
}

#[tokio::test]
async fn test_teststream_resume_past_the_end_completes_empty() {
    let (url, _stop) = start().await;
    let client = Client::new(&url).unwrap();

    let max = usize::MAX.to_string();
    for last in ["4", "1000", max.as_str()] {
        let stream = client
            .subscribe_from::<_, String>("teststream", json!({"text": "x"}), last)
            .await
            .unwrap();
        let messages: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert!(messages.is_empty(), "last_event_id {}: {:?}", last, messages);
    }
}

#[tokio::test]
async fn test_merged_user_router() {
    let (url, _stop) = start().await;
    let client = Client::new(&url).unwrap();

    let user: User = client
        .scope("user")
        .query("getById", json!({"id": "123"}))
        .await
        .unwrap();
    assert_eq!(user.name, "Carol");

    let error = client
        .query::<_, User>("getById", json!({"id": "123"}))
        .await
        .unwrap_err();
    assert_eq!(error.code(), Some(RpcErrorCode::NotFound));
}

#[tokio::test]
async fn test_create_user_validation() {
    let (url, _stop) = start().await;
    let users = Client::new(&url).unwrap().scope("user");

    let error = users
        .mutation::<_, User>("create", json!({"name": " ", "email": "nope"}))
        .await
        .unwrap_err();
    let rpc = error.as_rpc().unwrap();
    assert_eq!(rpc.code, RpcErrorCode::ValidationError);
    let fields = rpc.details.as_ref().unwrap()["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 2);

    let created: User = users
        .mutation("create", json!({"name": "Dave", "email": "dave@example.com"}))
        .await
        .unwrap();
    let fetched: User = users.query("getById", json!({"id": created.id})).await.unwrap();
    assert_eq!(fetched, created);

    let error = users
        .mutation::<_, User>("create", json!({"name": "Dave", "email": "DAVE@example.com"}))
        .await
        .unwrap_err();
    assert_eq!(error.code(), Some(RpcErrorCode::Conflict));
}

#[tokio::test]
async fn test_session_from_bearer_token() {
    let (url, _stop) = start().await;

    let anonymous = Client::new(&url).unwrap();
    let error = anonymous
        .query::<_, WhoAmI>("whoami", Value::Null)
        .await
        .unwrap_err();
    assert_eq!(error.code(), Some(RpcErrorCode::Unauthorized));

    let alice = Client::with_config(&url, ClientConfig::new().with_bearer_token("alice")).unwrap();
    let me: WhoAmI = alice.query("whoami", Value::Null).await.unwrap();
    assert_eq!(me.user, "alice");

    let error = anonymous
        .scope("user")
        .mutation::<_, Value>("delete", json!({"id": "2"}))
        .await
        .unwrap_err();
    assert_eq!(error.code(), Some(RpcErrorCode::Unauthorized));
    let deleted: Value = alice
        .scope("user")
        .mutation("delete", json!({"id": "2"}))
        .await
        .unwrap();
    assert_eq!(deleted, json!({"id": "2", "deleted": true}));
}

#[tokio::test]
async fn test_malformed_authorization_rejects_request() {
    let (url, _stop) = start().await;
    let client = Client::with_config(
        &url,
        ClientConfig::new().with_header("authorization", "Basic abc"),
    )
    .unwrap();

    let error = client
        .query::<_, Greeting>("hello", json!({"text": "x"}))
        .await
        .unwrap_err();
    assert!(
        matches!(&error, ClientError::Rpc(e) if e.code == RpcErrorCode::Internal),
        "{:?}",
        error
    );
}
