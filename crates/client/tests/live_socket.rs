//! End-to-end checks against a real WebSocket server on localhost.

use std::time::Duration;

use fixline_client::ws::ReconnectConfig;
use fixline_client::{ClientConfig, ClientEvent, ConnectionState, EventClient};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerSocket = WebSocketStream<tokio::net::TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

async fn listen() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut config =
        ClientConfig::for_endpoint(format!("ws://127.0.0.1:{port}/ws").parse().unwrap());
    config.heartbeat_delay = Duration::from_millis(20);
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        ..ReconnectConfig::default()
    };
    (listener, config)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    accept_async(stream).await.unwrap()
}

/// Next text frame as JSON, skipping the heartbeat.
async fn next_json(socket: &mut ServerSocket) -> Value {
    loop {
        let message = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = message {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] != "ping" {
                return value;
            }
        }
    }
}

async fn next_status(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    loop {
        match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            ClientEvent::Message(_) => continue,
            status => return status,
        }
    }
}

#[tokio::test]
async fn frames_flow_both_ways() {
    let (listener, config) = listen().await;
    let client = EventClient::new(config);
    let mut events = client.events();
    client.init();

    let mut server = accept(&listener).await;
    assert!(matches!(next_status(&mut events).await, ClientEvent::Connected));
    assert_eq!(client.state(), ConnectionState::Open);

    server
        .send(Message::Text(
            r#"{"type":"machine_added","payload":{"id":4,"name":"Grill"},"timestamp":"2025-01-15T10:00:00.000Z"}"#.into(),
        ))
        .await
        .unwrap();
    loop {
        if let ClientEvent::Message(envelope) = timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            assert_eq!(envelope.event_type, "machine_added");
            assert_eq!(envelope.payload["name"], "Grill");
            break;
        }
    }

    assert!(client.send("comment_added", json!({ "issueId": 4, "text": "On it" })));
    let frame = next_json(&mut server).await;
    assert_eq!(frame["type"], "comment_added");
    assert_eq!(frame["payload"]["text"], "On it");

    client.shutdown().await;
}

#[tokio::test]
async fn heartbeat_ping_is_sent() {
    let (listener, config) = listen().await;
    let client = EventClient::new(config);
    client.init();

    let mut server = accept(&listener).await;
    let message = timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
    let Message::Text(text) = message else {
        panic!("expected text frame, got {message:?}");
    };
    let value: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(value["type"], "ping");
    assert_eq!(value["payload"]["status"], "checking_connection");

    client.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let (listener, config) = listen().await;
    let client = EventClient::new(config);
    let mut events = client.events();
    client.init();

    let first = accept(&listener).await;
    assert!(matches!(next_status(&mut events).await, ClientEvent::Connected));
    drop(first);

    assert!(matches!(
        next_status(&mut events).await,
        ClientEvent::Disconnected { .. }
    ));
    let _second = accept(&listener).await;
    assert!(matches!(next_status(&mut events).await, ClientEvent::Connected));
    assert_eq!(client.reconnect_attempt(), 0);

    client.shutdown().await;
}

#[tokio::test]
async fn disconnect_sends_normal_closure() {
    let (listener, config) = listen().await;
    let client = EventClient::new(config);
    let mut events = client.events();
    client.init();

    let mut server = accept(&listener).await;
    assert!(matches!(next_status(&mut events).await, ClientEvent::Connected));

    client.disconnect();
    let close = loop {
        match timeout(WAIT, server.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    let close = close.expect("close frame carries a code");
    assert_eq!(u16::from(close.code), 1000);
    assert_eq!(close.reason.to_string(), "Disconnected by user");

    // No reconnect follows a requested disconnect.
    assert!(timeout(Duration::from_millis(400), listener.accept()).await.is_err());
}
