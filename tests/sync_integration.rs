//! End-to-end tests: a real server on an ephemeral port, driven by
//! WebSocket clients the way a browser editor would.

use async_trait::async_trait;
use colabri_sync::clients::identity::IdentityProvider;
use colabri_sync::clients::memory_store::MemoryDocumentStore;
use colabri_sync::config::Config;
use colabri_sync::error::IdentityError;
use colabri_sync::models::Document;
use colabri_sync::{build_router, AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEBOUNCE_MS: u64 = 20;

struct TokenList(Vec<&'static str>);

#[async_trait]
impl IdentityProvider for TokenList {
    async fn verify(&self, _username: &str, token: &str) -> Result<bool, IdentityError> {
        Ok(self.0.contains(&token))
    }
}

fn seeded_store() -> Arc<MemoryDocumentStore> {
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert(1, Document { id: Some(1), title: "T".into(), content: "hello\nworld".into() });
    store
}

/// Start a server on a free port, return its address and state.
async fn start_server(
    store: Arc<MemoryDocumentStore>,
    identity: Option<Arc<dyn IdentityProvider>>,
) -> (SocketAddr, AppState) {
    let config = Config { flush_debounce_ms: DEBOUNCE_MS, ..Config::default() };
    let state = AppState::new(config, store, identity);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr, query: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws?{query}")).await.unwrap();
    client
}

async fn wait_viewers(state: &AppState, expected: u32) {
    for _ in 0..200 {
        if state.engine.stats().await.viewers == expected {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("viewer count never reached {expected}");
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let message = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection ended")
            .unwrap();
        if let Message::Text(text) = message {
            return text.as_str().to_string();
        }
    }
}

async fn next_json(client: &mut Client) -> Value {
    serde_json::from_str(&next_text(client).await).unwrap()
}

async fn assert_silent(client: &mut Client) {
    if let Ok(Some(Ok(message))) = timeout(Duration::from_millis(150), client.next()).await {
        panic!("unexpected message: {message:?}");
    }
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string().into())).await.unwrap();
}

async fn expect_policy_close(client: &mut Client) {
    let message = timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for close")
        .expect("connection ended without close frame")
        .unwrap();
    match message {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_collaboration_scenario() {
    let store = seeded_store();
    let (addr, state) = start_server(store.clone(), None).await;

    let mut v1 = connect(addr, "docId=1&name=V1").await;
    wait_viewers(&state, 1).await;
    let mut v2 = connect(addr, "docId=1&name=V2").await;
    wait_viewers(&state, 2).await;

    assert_eq!(next_json(&mut v1).await, json!({"type": "VIEWER_CONNECTED", "data": {"name": "V2"}}));
    assert_silent(&mut v2).await;

    let change = json!({
        "type": "CONTENT_CHANGED",
        "data": {"type": "LINE_CHANGED", "lineIndex": 0, "changedContent": "HELLO"}
    })
    .to_string();
    send(&mut v1, &change).await;
    assert_eq!(next_text(&mut v2).await, change);
    assert_silent(&mut v1).await;

    let split = json!({
        "type": "CONTENT_CHANGED",
        "data": {"type": "LINE_ADDED", "lineIndex": 0, "cursorPosition": 3}
    })
    .to_string();
    send(&mut v1, &split).await;
    assert_eq!(next_text(&mut v2).await, split);

    sleep(Duration::from_millis(DEBOUNCE_MS * 10)).await;
    assert_eq!(store.content(1).unwrap().content, "HEL\nLO\nworld");

    v2.close(None).await.unwrap();
    assert_eq!(next_json(&mut v1).await, json!({"type": "VIEWER_DISCONNECTED", "data": {"name": "V2"}}));

    v1.close(None).await.unwrap();
    wait_viewers(&state, 0).await;
    for _ in 0..200 {
        if state.engine.registry().get(1).await.is_none() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("session for document 1 was not removed");
}

#[tokio::test]
async fn test_out_of_range_edit_is_rejected() {
    let (addr, state) = start_server(seeded_store(), None).await;

    let mut v1 = connect(addr, "docId=1&name=V1").await;
    wait_viewers(&state, 1).await;
    let mut v2 = connect(addr, "docId=1&name=V2").await;
    wait_viewers(&state, 2).await;
    next_json(&mut v1).await;

    let bad = json!({
        "type": "CONTENT_CHANGED",
        "data": {"type": "LINE_CHANGED", "lineIndex": 99, "changedContent": "x"}
    });
    send(&mut v1, &bad.to_string()).await;
    let reply = next_json(&mut v1).await;
    assert_eq!(reply["type"], "ERROR");
    assert!(reply["data"].is_string());
    assert_silent(&mut v2).await;

    send(&mut v1, "{not json").await;
    assert_eq!(next_json(&mut v1).await["type"], "ERROR");
    assert_silent(&mut v2).await;

    let session = state.engine.registry().get(1).await.unwrap();
    assert_eq!(session.state.lock().await.buffer.lines(), ["hello", "world"]);
}

#[tokio::test]
async fn test_handshake_requires_doc_id_and_name() {
    let (addr, state) = start_server(seeded_store(), None).await;

    for query in ["name=V1", "docId=1", "docId=abc&name=V1", "docId=1&name="] {
        let mut client = connect(addr, query).await;
        expect_policy_close(&mut client).await;
    }
    assert_eq!(state.engine.registry().len().await, 0);
}

#[tokio::test]
async fn test_duplicate_name_is_refused() {
    let (addr, state) = start_server(seeded_store(), None).await;

    let mut v1 = connect(addr, "docId=1&name=V1").await;
    wait_viewers(&state, 1).await;
    let mut twin = connect(addr, "docId=1&name=V1").await;
    expect_policy_close(&mut twin).await;
    assert_silent(&mut v1).await;
    assert_eq!(state.engine.stats().await.viewers, 1);
}

#[tokio::test]
async fn test_identity_token_is_verified() {
    let identity: Arc<dyn IdentityProvider> = Arc::new(TokenList(vec!["good"]));
    let (addr, state) = start_server(seeded_store(), Some(identity)).await;

    let mut anonymous = connect(addr, "docId=1&name=V1").await;
    expect_policy_close(&mut anonymous).await;
    let mut forged = connect(addr, "docId=1&name=V1&token=bad").await;
    expect_policy_close(&mut forged).await;
    assert_eq!(state.engine.stats().await.viewers, 0);

    let _verified = connect(addr, "docId=1&name=V1&token=good").await;
    wait_viewers(&state, 1).await;
}

#[tokio::test]
async fn test_documents_do_not_interfere() {
    let store = seeded_store();
    store.insert(2, Document { id: Some(2), title: "Other".into(), content: "x".into() });
    let (addr, state) = start_server(store.clone(), None).await;

    let mut a = connect(addr, "docId=1&name=A").await;
    let mut b = connect(addr, "docId=2&name=B").await;
    wait_viewers(&state, 2).await;

    for i in 0..20 {
        let edit_a = json!({
            "type": "CONTENT_CHANGED",
            "data": {"type": "LINE_CHANGED", "lineIndex": 1, "changedContent": format!("a{i}")}
        });
        let edit_b = json!({
            "type": "CONTENT_CHANGED",
            "data": {"type": "TITLE_CHANGED", "changedContent": format!("b{i}")}
        });
        send(&mut a, &edit_a.to_string()).await;
        send(&mut b, &edit_b.to_string()).await;
    }
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;

    sleep(Duration::from_millis(DEBOUNCE_MS * 10)).await;
    let doc1 = store.content(1).unwrap();
    let doc2 = store.content(2).unwrap();
    assert_eq!((doc1.title.as_str(), doc1.content.as_str()), ("T", "hello\na19"));
    assert_eq!((doc2.title.as_str(), doc2.content.as_str()), ("b19", "x"));
}
