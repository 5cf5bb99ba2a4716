pub mod client;
pub mod error;
pub mod realtime;
pub mod state;

pub use client::ServerClient;
pub use error::{ClientError, Result};
pub use realtime::ServerEvent;
pub use state::{ConnectionState, Telemetry};
