use serde::{Deserialize, Serialize};

use crate::paths::config_json_path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub proxy_port: u16,
    pub main_port: u16,
    pub api_key: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        let mut config = ServerConfig {
            host: "127.0.0.1".to_string(),
            proxy_port: 8765,
            main_port: 8080,
            api_key: String::new(),
            app_version: default_app_version(),
        };

        let json_path = config_json_path();
        if json_path.exists() {
            if let Ok(content) = std::fs::read_to_string(&json_path) {
                if let Ok(file_config) = serde_json::from_str::<ServerConfig>(&content) {
                    config = file_config;
                }
            }
        }

        if let Ok(host) = std::env::var("ADA_SERVER_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("ADA_PROXY_PORT") {
            if let Ok(port) = port.trim().parse() {
                config.proxy_port = port;
            }
        }
        if let Ok(port) = std::env::var("ADA_MAIN_PORT") {
            if let Ok(port) = port.trim().parse() {
                config.main_port = port;
            }
        }
        if let Ok(api_key) = std::env::var("ADA_API_KEY") {
            config.api_key = api_key;
        }
        config
    }

    /// Base URL for HTTP API calls (android proxy port).
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.proxy_port)
    }

    /// Websocket URL for the realtime channel (main server port).
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.main_port)
    }
}
