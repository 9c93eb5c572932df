//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("listen.path must start with '/', got '{0}'")]
    InvalidListenPath(String),
    #[error("limits.{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("timeouts.ping_period_secs ({ping}) must be below pong_wait_secs ({pong})")]
    PingNotShorterThanPong { ping: u64, pong: u64 },
    #[error("auth.header is required in header mode")]
    MissingAuthHeader,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if !config.listen.path.starts_with('/') {
        errors.push(ValidationError::InvalidListenPath(config.listen.path.clone()));
    }

    let limits = &config.limits;
    for (name, value) in [
        ("outbound_queue", limits.outbound_queue),
        ("inbound_queue", limits.inbound_queue),
        ("hub_commands", limits.hub_commands),
        ("max_frame_bytes", limits.max_frame_bytes),
        ("messages_per_second", limits.messages_per_second as usize),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit(name));
        }
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("ping_period_secs", timeouts.ping_period_secs),
        ("write_wait_secs", timeouts.write_wait_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }
    if timeouts.ping_period_secs >= timeouts.pong_wait_secs {
        errors.push(ValidationError::PingNotShorterThanPong {
            ping: timeouts.ping_period_secs,
            pong: timeouts.pong_wait_secs,
        });
    }

    if config.auth.mode == super::AuthMode::Header && config.auth.header.trim().is_empty() {
        errors.push(ValidationError::MissingAuthHeader);
    }

    if config.database.path != ":memory:" {
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(config.database.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
