//! Realtime channel task.
//!
//! One websocket connection to the main server, carrying named JSON event
//! frames: `{"event": "...", "data": ...}`. The task owns reconnection
//! (bounded attempts, fixed delay) and publishes every lifecycle transition
//! on the connection-state channel.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;

use crate::state::{ConnectionState, Telemetry};

pub(crate) const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-pushed event on the realtime channel.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    AdaResponse(serde_json::Value),
    ConsciousnessUpdate(serde_json::Value),
    EmotionState(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct EventFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub(crate) struct SocketConfig {
    pub url: String,
    pub api_key: String,
    pub auth_token: Option<String>,
}

enum SessionEnd {
    /// Remote closed an established connection.
    RemoteClose,
    Cancelled,
    /// Connection was never established.
    Failed(String),
    /// Established connection broke mid-session.
    Dropped(String),
}

/// Drive the realtime channel until cancelled or out of reconnect budget.
pub(crate) async fn run_socket(
    config: SocketConfig,
    state_tx: watch::Sender<ConnectionState>,
    telemetry_tx: watch::Sender<Telemetry>,
    events_tx: broadcast::Sender<ServerEvent>,
    cancel: CancellationToken,
) {
    let mut attempts: u32 = 0;

    while attempts < MAX_RECONNECT_ATTEMPTS {
        state_tx.send_replace(ConnectionState::Connecting);

        match run_session(&config, &state_tx, &telemetry_tx, &events_tx, &cancel).await {
            Ok(SessionEnd::Cancelled) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                return;
            }
            // The reconnect counter resets on every successful connect, so a
            // drop of an established connection starts a fresh budget.
            Ok(SessionEnd::RemoteClose) => {
                log::debug!("socket closed by remote");
                state_tx.send_replace(ConnectionState::Disconnected);
                attempts = 1;
            }
            Ok(SessionEnd::Dropped(reason)) => {
                log::error!("socket dropped: {reason}");
                state_tx.send_replace(ConnectionState::Error);
                attempts = 1;
            }
            Ok(SessionEnd::Failed(reason)) | Err(reason) => {
                log::error!("socket connection error: {reason}");
                state_tx.send_replace(ConnectionState::Error);
                attempts += 1;
            }
        }

        if attempts >= MAX_RECONNECT_ATTEMPTS {
            log::warn!("giving up after {attempts} reconnect attempts");
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                state_tx.send_replace(ConnectionState::Disconnected);
                return;
            }
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn run_session(
    config: &SocketConfig,
    state_tx: &watch::Sender<ConnectionState>,
    telemetry_tx: &watch::Sender<Telemetry>,
    events_tx: &broadcast::Sender<ServerEvent>,
    cancel: &CancellationToken,
) -> std::result::Result<SessionEnd, String> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| format!("invalid socket url: {e}"))?;

    let headers = request.headers_mut();
    headers.insert(
        "X-API-Key",
        HeaderValue::from_str(&config.api_key).map_err(|e| e.to_string())?,
    );
    if let Some(token) = &config.auth_token {
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| e.to_string())?,
        );
    }

    let connect = timeout(CONNECT_TIMEOUT, connect_async(request));
    let ws = tokio::select! {
        _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        result = connect => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return Ok(SessionEnd::Failed(e.to_string())),
            Err(_) => return Ok(SessionEnd::Failed("connect timed out".to_string())),
        },
    };

    state_tx.send_replace(ConnectionState::Connected);
    telemetry_tx.send_modify(|t| t.last_heartbeat = Some(Utc::now()));
    log::info!("realtime channel connected to {}", config.url);

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Cancelled);
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => handle_frame(&text, events_tx),
                Some(Ok(Message::Ping(data))) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        return Ok(SessionEnd::RemoteClose);
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::RemoteClose),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Ok(SessionEnd::Dropped(e.to_string())),
            },
        }
    }
}

fn handle_frame(text: &str, events_tx: &broadcast::Sender<ServerEvent>) {
    let frame = match serde_json::from_str::<EventFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("unparseable event frame: {e}");
            return;
        }
    };

    let event = match frame.event.as_str() {
        "ada_response" => ServerEvent::AdaResponse(frame.data),
        "consciousness_update" => ServerEvent::ConsciousnessUpdate(frame.data),
        "emotion_state" => ServerEvent::EmotionState(frame.data),
        other => {
            log::debug!("ignoring unknown event {other:?}");
            return;
        }
    };

    // Nobody listening is fine; events are observe-if-interested.
    let _ = events_tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_map_to_events() {
        let (tx, mut rx) = broadcast::channel(8);

        handle_frame(r#"{"event":"ada_response","data":{"text":"hi"}}"#, &tx);
        match rx.try_recv().unwrap() {
            ServerEvent::AdaResponse(data) => assert_eq!(data["text"], "hi"),
            other => panic!("unexpected event: {other:?}"),
        }

        handle_frame(r#"{"event":"emotion_state","data":{"mood":"calm"}}"#, &tx);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::EmotionState(_)
        ));
    }

    #[test]
    fn unknown_and_malformed_frames_are_dropped() {
        let (tx, mut rx) = broadcast::channel(8);
        handle_frame(r#"{"event":"unrelated","data":{}}"#, &tx);
        handle_frame("not json", &tx);
        assert!(rx.try_recv().is_err());
    }
}
