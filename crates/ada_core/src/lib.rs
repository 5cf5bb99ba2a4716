pub mod config;
pub mod encryption;
pub mod paths;
pub mod push;

pub use config::ServerConfig;
pub use push::{Notification, NotificationSink, PushPayload, RoutedPush};
