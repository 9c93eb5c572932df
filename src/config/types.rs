//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::auth::AuthConfig;
use super::limits::LimitsConfig;
use super::listen::ListenConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Hub configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server identity and observability.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket listener.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Authentication layer.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Queue capacities and inbound limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Keepalive and cleanup timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, reported in logs and `/health`.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: default_metrics_port(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_server_name() -> String {
    "social-hub".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "social.db".to_string()
}

/// Keepalive and cleanup timeouts for client connections.
///
/// The outbound pump probes the client every `ping_period_secs`; the inbound pump
/// gives up on a client that has sent nothing for `pong_wait_secs`. The probe
/// period must therefore be shorter than the idle deadline.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Idle-read deadline in seconds (default: 60).
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,
    /// Keepalive probe period in seconds (default: 54).
    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,
    /// Deadline for writing a single frame in seconds (default: 10).
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,
    /// Grace period for already-queued frames during cleanup (default: 250ms).
    #[serde(default = "default_flush_grace")]
    pub flush_grace_ms: u64,
    /// Bound on the cleanup's unregister request (default: 1000ms).
    #[serde(default = "default_unregister_timeout")]
    pub unregister_timeout_ms: u64,
}

impl TimeoutsConfig {
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn flush_grace(&self) -> Duration {
        Duration::from_millis(self.flush_grace_ms)
    }

    pub fn unregister_timeout(&self) -> Duration {
        Duration::from_millis(self.unregister_timeout_ms)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            pong_wait_secs: default_pong_wait(),
            ping_period_secs: default_ping_period(),
            write_wait_secs: default_write_wait(),
            flush_grace_ms: default_flush_grace(),
            unregister_timeout_ms: default_unregister_timeout(),
        }
    }
}

fn default_pong_wait() -> u64 {
    60
}

fn default_ping_period() -> u64 {
    54
}

fn default_write_wait() -> u64 {
    10
}

fn default_flush_grace() -> u64 {
    250
}

fn default_unregister_timeout() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn timeouts_default_values() {
        let config = TimeoutsConfig::default();
        assert_eq!(config.pong_wait_secs, 60);
        assert_eq!(config.ping_period_secs, 54);
        assert_eq!(config.write_wait_secs, 10);
        assert!(config.ping_period() < config.pong_wait());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").expect("empty config parses");
        assert_eq!(config.server.name, "social-hub");
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.database.path, "social.db");
        assert_eq!(config.limits.outbound_queue, 256);
    }

    #[test]
    fn load_reads_sections_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[server]
name = "hub.test"
metrics_port = 0
log_format = "json"

[listen]
address = "127.0.0.1:9001"

[database]
path = ":memory:"

[timeouts]
pong_wait_secs = 30
ping_period_secs = 20
"#
        )
        .expect("write config");

        let config = Config::load(file.path()).expect("config loads");
        assert_eq!(config.server.name, "hub.test");
        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.listen.address.port(), 9001);
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.timeouts.pong_wait(), Duration::from_secs(30));
        assert_eq!(config.timeouts.write_wait_secs, 10);
    }

    #[test]
    fn load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[server\nname = ").expect("write config");
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let result = Config::load("/nonexistent/social-hub.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
