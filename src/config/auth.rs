//! Authentication layer configuration.

use serde::Deserialize;

/// How an upgrade request is resolved to a user identity.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Trust an identity header set by the fronting proxy.
    #[default]
    Header,
    /// Look a session cookie up in the `sessions` table.
    Session,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Identity header name (header mode).
    #[serde(default = "default_header")]
    pub header: String,
    /// Session cookie name (session mode).
    #[serde(default = "default_cookie")]
    pub cookie: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            header: default_header(),
            cookie: default_cookie(),
        }
    }
}

fn default_header() -> String {
    "x-user-id".to_string()
}

fn default_cookie() -> String {
    "session_id".to_string()
}
