//! Authentication layer.
//!
//! Resolves a WebSocket upgrade request to a stable user identity before any
//! Client Actor exists. Credentials are captured from the request during the
//! handshake and then checked by an [`Authenticator`].

use crate::config::{AuthConfig, AuthMode};
use crate::db::{Database, DbError};
use crate::protocol::UserId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials presented")]
    Missing,
    #[error("credentials not recognized")]
    Rejected,
    #[error("authentication backend failed: {0}")]
    Backend(#[from] DbError),
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Missing => "missing_credentials",
            Self::Rejected => "rejected_credentials",
            Self::Backend(_) => "auth_backend",
        }
    }
}

/// What the upgrade request carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Value of the trusted identity header.
    pub identity_header: Option<String>,
    /// Value of the session cookie.
    pub session_cookie: Option<String>,
}

impl Credentials {
    /// Extract the configured header and cookie from an upgrade request.
    pub fn from_request<B>(req: &http::Request<B>, config: &AuthConfig) -> Self {
        let identity_header = req
            .headers()
            .get(config.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let session_cookie = req
            .headers()
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == config.cookie)
            .map(|(_, value)| value.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            identity_header,
            session_cookie,
        }
    }
}

/// Resolves credentials to a user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserId, AuthError>;
}

/// Trusts an identity header set by the fronting proxy, as long as the user exists.
pub struct TrustedHeader {
    db: Database,
}

impl TrustedHeader {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authenticator for TrustedHeader {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserId, AuthError> {
        let user_id = credentials
            .identity_header
            .as_deref()
            .ok_or(AuthError::Missing)?;
        if self.db.users().exists(user_id).await? {
            Ok(user_id.to_string())
        } else {
            Err(AuthError::Rejected)
        }
    }
}

/// Looks the session cookie up in the `sessions` table.
pub struct SessionTable {
    db: Database,
}

impl SessionTable {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authenticator for SessionTable {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserId, AuthError> {
        let session = credentials
            .session_cookie
            .as_deref()
            .ok_or(AuthError::Missing)?;
        self.db
            .sessions()
            .user_for(session)
            .await?
            .ok_or(AuthError::Rejected)
    }
}

/// Build the authenticator selected by `[auth] mode`.
pub fn from_config(config: &AuthConfig, db: Database) -> Arc<dyn Authenticator> {
    match config.mode {
        AuthMode::Header => Arc::new(TrustedHeader::new(db)),
        AuthMode::Session => Arc::new(SessionTable::new(db)),
    }
}
