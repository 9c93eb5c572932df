//! WebSocket listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Request path accepted for the upgrade (e.g., "/ws").
    #[serde(default = "default_path")]
    pub path: String,
    /// Allowed origins for the upgrade request (empty = allow all).
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            path: default_path(),
            allow_origins: Vec::new(),
        }
    }
}

impl ListenConfig {
    /// Whether an upgrade request from `origin` may proceed.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allow_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allow_origins.iter().any(|a| a == origin || a == "*"),
            None => false,
        }
    }
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_path() -> String {
    "/ws".to_string()
}
