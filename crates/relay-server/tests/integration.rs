//! End-to-end tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_server::{Hub, ServerConfig};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0, // auto-assign
        enqueue_wait_ms: 50,
        notify_timeout_ms: 200,
        ..ServerConfig::default()
    }
}

/// Boot a test server and return its base URLs plus the hub.
async fn boot_server() -> (String, String, Arc<Hub>) {
    boot_server_with(test_config()).await
}

async fn boot_server_with(config: ServerConfig) -> (String, String, Arc<Hub>) {
    let (hub, channels) = Hub::new(&config);
    let cancel = CancellationToken::new();
    tokio::spawn(Arc::clone(&hub).run(channels, cancel));

    let handle = relay_server::start(config, Arc::clone(&hub))
        .await
        .expect("server should start");
    let ws_url = format!("ws://{}/ws", handle.addr);
    let http_url = format!("http://{}", handle.addr);
    (ws_url, http_url, hub)
}

/// Wait until the hub has registered `count` clients.
async fn settle(hub: &Hub, count: usize) {
    let deadline = std::time::Instant::now() + TIMEOUT;
    while hub.client_count() != count {
        assert!(std::time::Instant::now() < deadline, "hub never settled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn connect(ws_url: &str, username: &str) -> WsStream {
    let url = format!("{ws_url}?username={username}");
    let (stream, _resp) = timeout(TIMEOUT, connect_async(&url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    stream
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send failed");
}

/// Read frames until one parses as a chat message of the given type.
async fn next_message_of_type(ws: &mut WsStream, kind: &str) -> Value {
    loop {
        let frame = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read failed");
        let Message::Text(text) = frame else { continue };
        let parsed: Value = serde_json::from_str(&text).expect("frame should be JSON");
        if parsed["type"] == kind {
            return parsed;
        }
    }
}

#[tokio::test]
async fn user_message_fans_out_to_all_clients() {
    let (ws_url, _http, hub) = boot_server().await;
    let mut alice = connect(&ws_url, "alice").await;
    let mut bob = connect(&ws_url, "bob").await;
    settle(&hub, 2).await;

    send_json(&mut alice, &json!({"message_content": "hi everyone"})).await;

    for ws in [&mut alice, &mut bob] {
        let msg = next_message_of_type(ws, "user").await;
        assert_eq!(msg["username"], "alice");
        assert_eq!(msg["message_content"], "hi everyone");
        assert!(msg["timestamp"].is_string());
    }
}

#[tokio::test]
async fn join_notifications_are_system_messages() {
    let (ws_url, _http, _hub) = boot_server().await;
    let mut alice = connect(&ws_url, "alice").await;
    let _bob = connect(&ws_url, "bob").await;

    let msg = next_message_of_type(&mut alice, "system").await;
    assert_eq!(msg["username"], "System");
    assert!(msg["message_content"]
        .as_str()
        .unwrap()
        .contains("has joined"));
}

#[tokio::test]
async fn health_reports_connected_clients() {
    let (ws_url, http_url, hub) = boot_server().await;
    let _alice = connect(&ws_url, "alice").await;
    let _bob = connect(&ws_url, "bob").await;
    settle(&hub, 2).await;

    let resp = reqwest::get(format!("{http_url}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 2);
    let names: Vec<&str> = body["usernames"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(names.contains(&"alice"));
    assert!(names.contains(&"bob"));
}

#[tokio::test]
async fn duplicate_username_is_rejected_over_the_wire() {
    let (ws_url, _http, hub) = boot_server().await;
    let _first = connect(&ws_url, "carol").await;
    settle(&hub, 1).await;

    let mut second = connect(&ws_url, "carol").await;
    let msg = next_message_of_type(&mut second, "system").await;
    assert!(msg["message_content"]
        .as_str()
        .unwrap()
        .contains("already connected"));

    // The rejected connection is closed after the error message.
    let deadline = std::time::Instant::now() + TIMEOUT;
    loop {
        assert!(std::time::Instant::now() < deadline, "connection never closed");
        match timeout(TIMEOUT, second.next()).await.expect("read timed out") {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(_)) => break,
        }
    }
    assert_eq!(hub.client_count(), 1);
}

#[tokio::test]
async fn missing_username_defaults_to_anonymous() {
    let (ws_url, _http, hub) = boot_server().await;
    let (mut anon, _resp) = timeout(TIMEOUT, connect_async(&ws_url))
        .await
        .unwrap()
        .expect("connect failed");
    let mut observer = connect(&ws_url, "observer").await;
    settle(&hub, 2).await;

    send_json(&mut anon, &json!({"message_content": "who am I"})).await;

    let msg = next_message_of_type(&mut observer, "user").await;
    assert_eq!(msg["username"], "Anonymous");
}

#[tokio::test]
async fn image_attachment_round_trips() {
    let (ws_url, _http, hub) = boot_server().await;
    let mut alice = connect(&ws_url, "alice").await;
    let mut bob = connect(&ws_url, "bob").await;
    settle(&hub, 2).await;

    send_json(
        &mut alice,
        &json!({
            "message_content": "look",
            "imagen_data": "iVBORw0KGgo=",
            "imagen_type": "image/png",
        }),
    )
    .await;

    let msg = next_message_of_type(&mut bob, "user").await;
    assert_eq!(msg["username"], "alice");
    assert_eq!(msg["imagen_data"], "iVBORw0KGgo=");
    assert_eq!(msg["imagen_type"], "image/png");
}

#[tokio::test]
async fn malformed_and_unsupported_frames_are_skipped() {
    let (ws_url, _http, hub) = boot_server().await;
    let mut alice = connect(&ws_url, "alice").await;
    let mut bob = connect(&ws_url, "bob").await;
    settle(&hub, 2).await;

    // Malformed JSON: logged and skipped, connection stays open.
    alice
        .send(Message::Text("not json at all".into()))
        .await
        .unwrap();
    // Unsupported attachment type: dropped.
    send_json(
        &mut alice,
        &json!({"imagen_data": "AAAA", "imagen_type": "image/gif"}),
    )
    .await;
    // A valid message afterwards still goes through.
    send_json(&mut alice, &json!({"message_content": "still here"})).await;

    let msg = next_message_of_type(&mut bob, "user").await;
    assert_eq!(msg["message_content"], "still here");
    assert!(msg.get("imagen_data").is_none());
}

#[tokio::test]
async fn silent_peer_is_torn_down_within_pong_window() {
    let config = ServerConfig {
        ping_interval_secs: 1,
        pong_timeout_secs: 1,
        ..test_config()
    };
    let (ws_url, _http, hub) = boot_server_with(config).await;

    // Connect, then go completely quiet: never read (so the client stack
    // answers no pings) and never write.
    let idle = connect(&ws_url, "idle").await;
    settle(&hub, 1).await;

    // The read deadline expires and the server evicts the dead peer on
    // its own, without any broadcast traffic to flush it out.
    settle(&hub, 0).await;
    assert_eq!(hub.client_count(), 0);
    drop(idle);
}

#[tokio::test]
async fn disconnect_unregisters_and_notifies() {
    let (ws_url, _http, hub) = boot_server().await;
    let mut alice = connect(&ws_url, "alice").await;
    let bob = connect(&ws_url, "bob").await;
    settle(&hub, 2).await;

    drop(bob);

    settle(&hub, 1).await;
    assert_eq!(hub.connected_names(), vec!["alice"]);

    // Alice hears about the departure.
    loop {
        let msg = next_message_of_type(&mut alice, "system").await;
        if msg["message_content"].as_str().unwrap().contains("has left") {
            break;
        }
    }
}
