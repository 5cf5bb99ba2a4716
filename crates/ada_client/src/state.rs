use chrono::{DateTime, Utc};

/// Connection state of the realtime channel.
/// Reset to Disconnected on process start; mutated only by the socket task
/// (and by an explicit `disconnect()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Observed link quality, updated on every completed HTTP call and on
/// socket open.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub latency_ms: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub server_version: Option<String>,
}
