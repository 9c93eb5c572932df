//! Unified error handling for social-hub handlers.
//!
//! Every failure a handler can hit maps to a static error code (used for metrics
//! labels) and to an outbound error envelope. Persistence failures are reported to
//! the client generically; the underlying error is only logged.

use crate::db::DbError;
use crate::protocol::{ProtocolError, ServerMessage};
use thiserror::Error;

// ============================================================================
// Handler Errors (message processing)
// ============================================================================

/// Errors that can occur while handling one inbound message.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("cannot {0} yourself")]
    SelfAction(&'static str),

    #[error("user not found")]
    UserNotFound,

    #[error("group not found")]
    GroupNotFound,

    #[error("event not found")]
    EventNotFound,

    #[error("notification not found")]
    NotificationNotFound,

    #[error("already following this user")]
    AlreadyFollowing,

    #[error("not following this user")]
    NotFollowing,

    #[error("request already sent")]
    RequestAlreadySent,

    #[error("no pending request")]
    NoPendingRequest,

    #[error("already a member of this group")]
    AlreadyMember,

    #[error("not a member of this group")]
    NotMember,

    #[error("only the group admin can do that")]
    NotAdmin,

    #[error("the group admin cannot do that")]
    AdminForbidden,

    #[error("invitation already sent")]
    InvitationAlreadySent,

    #[error("no pending invitation")]
    NoPendingInvitation,

    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("event with the same details already exists")]
    DuplicateEvent,

    #[error("database error: {0}")]
    Database(#[from] DbError),
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.error_code(),
            Self::SelfAction(_) => "self_action",
            Self::UserNotFound => "user_not_found",
            Self::GroupNotFound => "group_not_found",
            Self::EventNotFound => "event_not_found",
            Self::NotificationNotFound => "notification_not_found",
            Self::AlreadyFollowing => "already_following",
            Self::NotFollowing => "not_following",
            Self::RequestAlreadySent => "request_already_sent",
            Self::NoPendingRequest => "no_pending_request",
            Self::AlreadyMember => "already_member",
            Self::NotMember => "not_member",
            Self::NotAdmin => "not_admin",
            Self::AdminForbidden => "admin_forbidden",
            Self::InvitationAlreadySent => "invitation_already_sent",
            Self::NoPendingInvitation => "no_pending_invitation",
            Self::EmptyMessage => "empty_message",
            Self::MissingField(_) => "missing_field",
            Self::DuplicateEvent => "duplicate_event",
            Self::Database(_) => "internal_error",
        }
    }

    /// Whether the failure is the server's fault rather than the client's.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Convert to the error envelope sent back to the client.
    pub fn to_envelope(&self) -> ServerMessage {
        let message = if self.is_internal() {
            "request failed".to_string()
        } else {
            self.to_string()
        };
        ServerMessage::Error {
            code: self.error_code(),
            message,
        }
    }
}

impl From<sqlx::Error> for HandlerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DbError::from(err))
    }
}

/// Result type for message handlers.
pub type HandlerResult = Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_snake_case() {
        let errors = [
            HandlerError::SelfAction("follow"),
            HandlerError::RequestAlreadySent,
            HandlerError::NotAdmin,
            HandlerError::MissingField("title"),
            HandlerError::Protocol(ProtocolError::RateLimited),
        ];
        for err in errors {
            let code = err.error_code();
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{code}");
        }
    }

    #[test]
    fn validation_error_envelope_keeps_message() {
        match HandlerError::SelfAction("follow").to_envelope() {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, "self_action");
                assert_eq!(message, "cannot follow yourself");
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn database_error_envelope_is_generic() {
        let err = HandlerError::Database(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        assert!(err.is_internal());
        match err.to_envelope() {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, "internal_error");
                assert_eq!(message, "request failed");
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn protocol_errors_keep_their_code() {
        let err = HandlerError::from(ProtocolError::UnknownKind("x".into()));
        assert_eq!(err.error_code(), "unknown_kind");
        assert!(!err.is_internal());
    }
}
