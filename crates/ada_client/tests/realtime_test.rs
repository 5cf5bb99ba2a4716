use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ada_client::{ConnectionState, ServerClient, ServerEvent};
use ada_core::ServerConfig;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;

const WAIT: Duration = Duration::from_secs(5);

fn test_client(addr: SocketAddr) -> ServerClient {
    let config = ServerConfig {
        host: addr.ip().to_string(),
        proxy_port: addr.port(),
        main_port: addr.port(),
        api_key: "test-key".to_string(),
        app_version: "0.1.0".to_string(),
    };
    ServerClient::new(config).expect("client")
}

/// Accept websocket connections, count them, and hand each one an optional
/// greeting frame. Connections are held open until the client goes away.
async fn spawn_ws_server(greeting: Option<String>) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let greeting = greeting.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                if let Some(frame) = greeting {
                    let _ = ws.send(Message::Text(frame)).await;
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    (addr, connections)
}

#[tokio::test]
async fn connect_transitions_to_connected_and_stamps_heartbeat() {
    let (addr, _connections) = spawn_ws_server(None).await;
    let client = test_client(addr);

    let mut state_rx = client.subscribe_state();
    client.connect();

    timeout(WAIT, state_rx.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .expect("timeout")
        .expect("state channel");
    assert!(client.is_connected());
    assert!(client.telemetry().last_heartbeat.is_some());
}

#[tokio::test]
async fn double_connect_performs_one_socket_setup() {
    let (addr, connections) = spawn_ws_server(None).await;
    let client = test_client(addr);

    let mut state_rx = client.subscribe_state();
    client.connect();
    client.connect();

    timeout(WAIT, state_rx.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .expect("timeout")
        .expect("state channel");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn named_events_are_republished() {
    let frame = r#"{"event":"ada_response","data":{"text":"hello there"}}"#;
    let (addr, _connections) = spawn_ws_server(Some(frame.to_string())).await;
    let client = test_client(addr);

    let mut events = client.subscribe_events();
    client.connect();

    let event = timeout(WAIT, events.recv())
        .await
        .expect("timeout")
        .expect("event channel");
    match event {
        ServerEvent::AdaResponse(data) => assert_eq!(data["text"], "hello there"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn handshake_carries_api_key_and_bearer_headers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(Mutex::new(None::<(Option<String>, Option<String>)>));
    let seen_in_server = seen.clone();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let seen = seen_in_server.clone();
        let callback = move |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
                             resp: tokio_tungstenite::tungstenite::handshake::server::Response| {
            let get = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            *seen.lock().unwrap() = Some((get("X-API-Key"), get("Authorization")));
            Ok(resp)
        };
        if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    let client = test_client(addr);
    client.configure(Some("t1".to_string()), None);

    let mut state_rx = client.subscribe_state();
    client.connect();
    timeout(WAIT, state_rx.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .expect("timeout")
        .expect("state channel");

    let headers = seen.lock().unwrap().clone().expect("handshake seen");
    assert_eq!(headers.0.as_deref(), Some("test-key"));
    assert_eq!(headers.1.as_deref(), Some("Bearer t1"));
}

#[tokio::test]
async fn connect_failure_surfaces_error_state() {
    // Grab a port with no listener behind it.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = test_client(addr);
    let mut state_rx = client.subscribe_state();
    client.connect();

    timeout(WAIT, state_rx.wait_for(|s| *s == ConnectionState::Error))
        .await
        .expect("timeout")
        .expect("state channel");
}

#[tokio::test]
async fn disconnect_closes_and_is_idempotent() {
    let (addr, _connections) = spawn_ws_server(None).await;
    let client = test_client(addr);

    let mut state_rx = client.subscribe_state();
    client.connect();
    timeout(WAIT, state_rx.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .expect("timeout")
        .expect("state channel");

    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // Already disconnected: state is left unchanged.
    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn reconnect_right_after_disconnect_settles_connected() {
    let (addr, connections) = spawn_ws_server(None).await;
    let client = test_client(addr);

    let mut state_rx = client.subscribe_state();
    client.connect();
    timeout(WAIT, state_rx.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .expect("timeout")
        .expect("state channel");

    client.disconnect();
    client.connect();
    // The aborted task must not overwrite the fresh connection attempt.
    assert_eq!(client.connection_state(), ConnectionState::Connecting);

    timeout(WAIT, state_rx.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .expect("timeout")
        .expect("state channel");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disconnect_without_connect_is_a_no_op() {
    let (addr, _connections) = spawn_ws_server(None).await;
    let client = test_client(addr);

    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}
