//! Single point of HTTP and realtime communication with the A.D.A. server.

use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use ada_core::ServerConfig;
use chrono::Utc;
use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::realtime::{run_socket, ServerEvent, SocketConfig};
use crate::state::{ConnectionState, Telemetry};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default)]
struct Credentials {
    auth_token: Option<String>,
    push_token: Option<String>,
}

struct SocketHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ServerClient {
    http: ClientWithMiddleware,
    config: ServerConfig,
    credentials: RwLock<Credentials>,
    state_tx: watch::Sender<ConnectionState>,
    telemetry_tx: watch::Sender<Telemetry>,
    events_tx: broadcast::Sender<ServerEvent>,
    socket: Mutex<Option<SocketHandle>>,
}

impl ServerClient {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let http = Self::build_retry_client(Self::build_http_client(&config)?);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (telemetry_tx, _) = watch::channel(Telemetry::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(ServerClient {
            http,
            config,
            credentials: RwLock::new(Credentials::default()),
            state_tx,
            telemetry_tx,
            events_tx,
            socket: Mutex::new(None),
        })
    }

    fn build_http_client(config: &ServerConfig) -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("X-API-Key", HeaderValue::from_str(&config.api_key)?);

        Ok(Client::builder()
            .default_headers(headers)
            .connect_timeout(HTTP_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()?)
    }

    fn build_retry_client(client: Client) -> ClientWithMiddleware {
        // Exponential backoff: 1s, 2s, 4s with jitter
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    /// Set credentials used by subsequent calls. No network effect.
    pub fn configure(&self, auth_token: Option<String>, push_token: Option<String>) {
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(|e| e.into_inner());
        credentials.auth_token = auth_token;
        credentials.push_token = push_token;
    }

    fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // Observation

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry_tx.borrow().clone()
    }

    pub fn subscribe_telemetry(&self) -> watch::Receiver<Telemetry> {
        self.telemetry_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    // Realtime channel

    /// Open the realtime socket. No-op while a connection attempt is
    /// already in flight; an established socket is replaced.
    pub fn connect(&self) {
        let mut slot = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        if self.connection_state() == ConnectionState::Connecting {
            return;
        }
        if let Some(handle) = slot.take() {
            handle.cancel.cancel();
            handle.task.abort();
        }

        self.state_tx.send_replace(ConnectionState::Connecting);

        let socket_config = SocketConfig {
            url: self.config.ws_url(),
            api_key: self.config.api_key.clone(),
            auth_token: self.credentials().auth_token,
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_socket(
            socket_config,
            self.state_tx.clone(),
            self.telemetry_tx.clone(),
            self.events_tx.clone(),
            cancel.clone(),
        ));
        *slot = Some(SocketHandle { cancel, task });
    }

    /// Close the socket. Safe to call when already disconnected.
    /// The task is aborted, not just cancelled, so its final state write
    /// cannot land after a subsequent `connect()`.
    pub fn disconnect(&self) {
        let mut slot = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.cancel.cancel();
            handle.task.abort();
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    // HTTP

    /// GET request. `Ok(None)` when the response body is empty.
    pub async fn get(&self, endpoint: &str) -> Result<Option<Value>> {
        let url = format!("{}{}", self.config.http_url(), endpoint);
        self.execute(self.http.get(&url)).await
    }

    /// POST request with a JSON body.
    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Option<Value>> {
        let url = format!("{}{}", self.config.http_url(), endpoint);
        self.execute(self.http.post(&url).json(body)).await
    }

    async fn execute(&self, mut request: RequestBuilder) -> Result<Option<Value>> {
        if let Some(token) = self.credentials().auth_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            error!("request failed: {e}");
            e
        })?;

        let latency = start.elapsed().as_millis() as u32;
        self.telemetry_tx.send_modify(|t| t.latency_ms = latency);
        debug!("{} -> {} ({latency} ms)", response.url(), response.status());

        // The body is parsed regardless of HTTP status; server-side
        // rejections travel as JSON with success=false.
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Time a health probe; updates latency, heartbeat and server version.
    pub async fn check_server_health(&self) -> bool {
        match self.get("/api/health").await {
            Ok(response) => {
                self.telemetry_tx.send_modify(|t| {
                    t.last_heartbeat = Some(Utc::now());
                    if let Some(version) = response
                        .as_ref()
                        .and_then(|r| r.get("version"))
                        .and_then(Value::as_str)
                    {
                        t.server_version = Some(version.to_string());
                    }
                });
                response.is_some()
            }
            Err(e) => {
                error!("health check failed: {e}");
                false
            }
        }
    }

    // Fixed-shape endpoint wrappers

    /// Send a chat message to A.D.A.
    pub async fn send_message(&self, message: &str) -> Result<Option<Value>> {
        let user_id = self
            .credentials()
            .auth_token
            .unwrap_or_else(|| "ada_user".to_string());
        self.post("/api/chat", &json!({ "message": message, "user_id": user_id }))
            .await
    }

    /// Execute a named command on the server.
    pub async fn execute_command(
        &self,
        command: &str,
        parameters: Value,
    ) -> Result<Option<Value>> {
        let mut body = match parameters {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("parameters".to_string(), other);
                map
            }
        };
        body.insert("command".to_string(), Value::String(command.to_string()));
        self.post("/api/android/command", &Value::Object(body)).await
    }

    pub async fn consciousness_state(&self) -> Result<Option<Value>> {
        self.get("/api/android/consciousness/state").await
    }

    pub async fn emotion_state(&self) -> Result<Option<Value>> {
        self.get("/api/android/emotion/state").await
    }

    pub async fn system_status(&self) -> Result<Option<Value>> {
        self.get("/api/android/system/status").await
    }

    /// Register a device push token with the server.
    pub async fn register_push_token(&self, token: &str) -> Result<bool> {
        {
            let mut credentials = self
                .credentials
                .write()
                .unwrap_or_else(|e| e.into_inner());
            credentials.push_token = Some(token.to_string());
        }

        let body = json!({
            "device_token": token,
            "platform": std::env::consts::OS,
            "app_version": self.config.app_version,
            "device_info": {
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            },
        });

        let response = self.post("/api/android/push/register", &body).await?;
        Ok(response
            .as_ref()
            .and_then(|r| r.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Unregister the held push token. Succeeds trivially when none is held.
    pub async fn unregister_push_token(&self) -> Result<bool> {
        let Some(token) = self.credentials().push_token else {
            return Ok(true);
        };

        self.post("/api/android/push/unregister", &json!({ "device_token": token }))
            .await?;

        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(|e| e.into_inner());
        credentials.push_token = None;
        Ok(true)
    }
}

impl Drop for ServerClient {
    fn drop(&mut self) {
        if let Some(handle) = self
            .socket
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.cancel.cancel();
        }
    }
}
