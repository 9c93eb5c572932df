//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, DatabaseConfig,
//!   TimeoutsConfig)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`auth`]: Authentication layer selection (AuthConfig)
//! - [`limits`]: Queue capacities, frame size and inbound rate limits (LimitsConfig)
//! - [`validation`]: Startup validation returning every error found

mod auth;
mod limits;
mod listen;
mod types;
pub mod validation;

pub use auth::{AuthConfig, AuthMode};
pub use limits::LimitsConfig;
pub use listen::ListenConfig;
pub use types::{Config, ConfigError, DatabaseConfig, LogFormat, ServerConfig, TimeoutsConfig};
pub use validation::{ValidationError, validate};
