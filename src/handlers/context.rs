//! Per-client handler context.

use crate::db::Database;
use crate::error::{HandlerError, HandlerResult};
use crate::hub::Hub;
use crate::protocol::{ActorSummary, Frame, ServerMessage, UserId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Everything a handler needs: who is asking, the hub, the store, and a way to
/// answer the client directly.
pub struct Context {
    pub user_id: UserId,
    pub conn_id: Uuid,
    pub hub: Hub,
    pub db: Database,
    reply: mpsc::Sender<Frame>,
}

impl Context {
    pub fn new(
        user_id: UserId,
        conn_id: Uuid,
        hub: Hub,
        db: Database,
        reply: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            user_id,
            conn_id,
            hub,
            db,
            reply,
        }
    }

    /// Queue a message for this client. Never blocks; a full queue drops it.
    pub fn reply(&self, message: &ServerMessage) {
        match self.reply.try_send(message.to_frame()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(user_id = %self.user_id, "Reply dropped: outbound queue full");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.reply(&ServerMessage::success(message));
    }

    /// Fails with [`HandlerError::SelfAction`] when `other` is the sender.
    pub fn ensure_not_self(&self, other: &str, action: &'static str) -> HandlerResult {
        if other == self.user_id {
            return Err(HandlerError::SelfAction(action));
        }
        Ok(())
    }

    /// The sender's profile summary, attached to outgoing notifications.
    pub async fn actor(&self) -> Result<ActorSummary, HandlerError> {
        self.db
            .users()
            .summary(&self.user_id)
            .await?
            .ok_or(HandlerError::UserNotFound)
    }

    /// Add `user_id` to the live fan-out set of `group_id`.
    ///
    /// The membership row is already written, so a stopped hub only costs the
    /// live echo until the user reconnects.
    pub async fn join_live_group(&self, user_id: &str, group_id: &str) {
        if let Err(e) = self.hub.join_group(user_id, group_id).await {
            warn!(user_id = %user_id, group_id = %group_id, error = %e, "Live group join failed");
        }
    }

    pub async fn leave_live_group(&self, user_id: &str, group_id: &str) {
        if let Err(e) = self.hub.leave_group(user_id, group_id).await {
            warn!(user_id = %user_id, group_id = %group_id, error = %e, "Live group leave failed");
        }
    }
}
