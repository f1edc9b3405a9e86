//! End-to-end relay tests: mock transport on one side, a real HTTP stub
//! standing in for the companion backend on the other.

mod common;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use companion_bridge::config::Config;
use companion_bridge::connection::{self, ConnectionHandle};
use companion_bridge::relay::{MessageRelay, APOLOGY_TEXT};
use companion_bridge::transport::{CloseReason, InboundMessage, TransportEvent};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Backend that replies `echo:<sender>:<text>` and counts calls
fn echo_backend(calls: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/api/whatsapp/process",
        post(move |Json(body): Json<Value>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let phone = body["phone_number"].as_str().unwrap_or("").to_string();
                let text = body["message"].as_str().unwrap_or("").to_string();
                Json(json!({ "reply": format!("echo:{}:{}", phone, text) }))
            }
        }),
    )
}

/// Backend that acknowledges without a reply
fn silent_backend() -> Router {
    Router::new().route(
        "/api/whatsapp/process",
        post(|| async { Json(json!({ "suggested_tasks": ["noted"] })) }),
    )
}

/// Backend that always errors
fn broken_backend() -> Router {
    Router::new().route(
        "/api/whatsapp/process",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "boom" })),
            )
        }),
    )
}

async fn start_bridge(
    backend_url: &str,
) -> (
    ConnectionHandle,
    mpsc::Sender<TransportEvent>,
    Arc<common::MockTransport>,
) {
    let temp = tempfile::TempDir::new().unwrap();
    let mut config = Config::for_test(temp.path());
    config.backend_url = backend_url.to_string();

    let transport = common::MockTransport::new();
    let (event_tx, event_rx) = mpsc::channel(16);
    let handle = ConnectionHandle::new(transport.clone());
    let relay = Arc::new(MessageRelay::new(&config, handle.clone()).unwrap());
    connection::spawn(handle.clone(), event_rx, relay);

    (handle, event_tx, transport)
}

fn inbound(sender: &str, text: &str, id: &str) -> TransportEvent {
    TransportEvent::Message(InboundMessage {
        sender: sender.to_string(),
        text: text.to_string(),
        message_id: id.to_string(),
        timestamp: 1_700_000_000,
        from_me: false,
    })
}

async fn establish(events: &mpsc::Sender<TransportEvent>, identity: &str) {
    events
        .send(TransportEvent::Established {
            identity: identity.to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reply_round_trip() {
    let backend = spawn_backend(echo_backend(Arc::new(AtomicUsize::new(0)))).await;
    let (_handle, events, transport) = start_bridge(&backend).await;

    establish(&events, "19995550000").await;
    events
        .send(inbound("16175551234", "hello there", "MSG-1"))
        .await
        .unwrap();

    let transport_clone = transport.clone();
    assert!(
        common::wait_for(|| {
            let transport = transport_clone.clone();
            async move { !transport.sent_snapshot().await.is_empty() }
        })
        .await
    );

    let sent = transport.sent_snapshot().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "16175551234");
    assert_eq!(sent[0].1, "echo:16175551234:hello there");
}

#[tokio::test]
async fn test_empty_reply_sends_nothing() {
    let backend = spawn_backend(silent_backend()).await;
    let (_handle, events, transport) = start_bridge(&backend).await;

    establish(&events, "19995550000").await;
    events
        .send(inbound("16175551234", "just noting this", "MSG-1"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(transport.sent_snapshot().await.is_empty());
}

#[tokio::test]
async fn test_backend_error_sends_apology() {
    let backend = spawn_backend(broken_backend()).await;
    let (_handle, events, transport) = start_bridge(&backend).await;

    establish(&events, "19995550000").await;
    events
        .send(inbound("16175551234", "are you there?", "MSG-1"))
        .await
        .unwrap();

    let transport_clone = transport.clone();
    assert!(
        common::wait_for(|| {
            let transport = transport_clone.clone();
            async move { !transport.sent_snapshot().await.is_empty() }
        })
        .await
    );

    let sent = transport.sent_snapshot().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "16175551234");
    assert_eq!(sent[0].1, APOLOGY_TEXT);
}

#[tokio::test]
async fn test_unreachable_backend_sends_apology() {
    // Nothing listens on port 1
    let (_handle, events, transport) = start_bridge("http://127.0.0.1:1").await;

    establish(&events, "19995550000").await;
    events
        .send(inbound("16175551234", "hello?", "MSG-1"))
        .await
        .unwrap();

    let transport_clone = transport.clone();
    assert!(
        common::wait_for(|| {
            let transport = transport_clone.clone();
            async move { !transport.sent_snapshot().await.is_empty() }
        })
        .await
    );

    let sent = transport.sent_snapshot().await;
    assert_eq!(sent[0].1, APOLOGY_TEXT);
}

#[tokio::test]
async fn test_own_messages_are_suppressed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = spawn_backend(echo_backend(calls.clone())).await;
    let (_handle, events, transport) = start_bridge(&backend).await;

    establish(&events, "19995550000").await;

    // Sender equals the bridge's own identity
    events
        .send(inbound("19995550000", "talking to myself", "MSG-1"))
        .await
        .unwrap();
    // Transport flagged it as self-authored
    events
        .send(TransportEvent::Message(InboundMessage {
            sender: "16175551234".to_string(),
            text: "sent from the paired phone".to_string(),
            message_id: "MSG-2".to_string(),
            timestamp: 1_700_000_000,
            from_me: true,
        }))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(transport.sent_snapshot().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_senders_get_their_own_replies() {
    let backend = spawn_backend(echo_backend(Arc::new(AtomicUsize::new(0)))).await;
    let (_handle, events, transport) = start_bridge(&backend).await;

    establish(&events, "19995550000").await;
    events
        .send(inbound("16175551111", "from alice", "MSG-A"))
        .await
        .unwrap();
    events
        .send(inbound("16175552222", "from bob", "MSG-B"))
        .await
        .unwrap();

    let transport_clone = transport.clone();
    assert!(
        common::wait_for(|| {
            let transport = transport_clone.clone();
            async move { transport.sent_snapshot().await.len() == 2 }
        })
        .await
    );

    let sent = transport.sent_snapshot().await;
    for (destination, text) in &sent {
        match destination.as_str() {
            "16175551111" => assert_eq!(text, "echo:16175551111:from alice"),
            "16175552222" => assert_eq!(text, "echo:16175552222:from bob"),
            other => panic!("unexpected destination {}", other),
        }
    }
}

#[tokio::test]
async fn test_relay_does_not_block_lifecycle_events() {
    // A backend that hangs must not delay handling of a close event
    let slow_backend = Router::new().route(
        "/api/whatsapp/process",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({ "reply": "too late" }))
        }),
    );
    let backend = spawn_backend(slow_backend).await;
    let (handle, events, _transport) = start_bridge(&backend).await;

    establish(&events, "19995550000").await;
    events
        .send(inbound("16175551234", "start something slow", "MSG-1"))
        .await
        .unwrap();
    events
        .send(TransportEvent::Closed {
            reason: CloseReason::LoggedOut,
        })
        .await
        .unwrap();

    let handle_clone = handle.clone();
    assert!(
        common::wait_for(|| {
            let handle = handle_clone.clone();
            async move { !handle.status().await.connected }
        })
        .await
    );
}

#[tokio::test]
async fn test_logged_out_close_blocks_sends() {
    let backend = spawn_backend(silent_backend()).await;
    let (handle, events, transport) = start_bridge(&backend).await;

    establish(&events, "19995550000").await;
    let handle_clone = handle.clone();
    assert!(
        common::wait_for(|| {
            let handle = handle_clone.clone();
            async move { handle.status().await.connected }
        })
        .await
    );

    events
        .send(TransportEvent::Closed {
            reason: CloseReason::LoggedOut,
        })
        .await
        .unwrap();

    let handle_clone = handle.clone();
    assert!(
        common::wait_for(|| {
            let handle = handle_clone.clone();
            async move { !handle.status().await.connected }
        })
        .await
    );

    let result = handle.send("16175551234", "anyone home?").await;
    assert!(result.is_err());
    assert!(transport.sent_snapshot().await.is_empty());
}
