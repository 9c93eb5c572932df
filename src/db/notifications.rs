//! Durable notification records.
//!
//! A notification row is the source of truth for "what happened". The live push
//! delivered over the socket is a best-effort echo of it; clients that were offline
//! fetch their unread rows on their next login.

use super::{DbError, new_id, now};
use crate::protocol::ActorSummary;
use serde::Serialize;
use sqlx::SqlitePool;

/// A notification to be written.
#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub actor_id: &'a str,
    pub recipient_id: &'a str,
    pub group_id: Option<&'a str>,
    pub kind: &'a str,
    pub message: String,
    pub entity_id: Option<&'a str>,
    pub entity_type: Option<&'a str>,
}

/// A stored notification with its actor's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    pub id: String,
    pub kind: String,
    pub message: String,
    pub actor: ActorSummary,
    pub group_id: Option<String>,
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub is_read: bool,
    pub created_at: i64,
}

type NotificationRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
);

const SELECT_WITH_ACTOR: &str = r#"
    SELECT n.id, n.kind, n.message,
           n.actor_id, COALESCE(u.first_name, ''), COALESCE(u.last_name, ''),
           COALESCE(u.nickname, ''), COALESCE(u.avatar, ''),
           n.recipient_group_id, n.entity_id, n.entity_type, n.is_read, n.created_at
    FROM notifications n
    LEFT JOIN users u ON u.id = n.actor_id
"#;

/// Repository for notifications.
pub struct NotificationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Write a notification, returning its id.
    pub async fn insert(&self, n: &NewNotification<'_>) -> Result<String, DbError> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, actor_id, recipient_id, recipient_group_id, kind, message,
                 entity_id, entity_type, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(n.actor_id)
        .bind(n.recipient_id)
        .bind(n.group_id)
        .bind(n.kind)
        .bind(&n.message)
        .bind(n.entity_id)
        .bind(n.entity_type)
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(id)
    }

    /// Write a notification unless one with the same actor, recipient, kind and
    /// entity already exists. Returns the new id, or `None` for a duplicate.
    pub async fn insert_unique(&self, n: &NewNotification<'_>) -> Result<Option<String>, DbError> {
        let existing: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM notifications
            WHERE actor_id = ? AND recipient_id = ? AND kind = ? AND entity_id IS ?
            "#,
        )
        .bind(n.actor_id)
        .bind(n.recipient_id)
        .bind(n.kind)
        .bind(n.entity_id)
        .fetch_optional(self.pool)
        .await?;

        if existing.is_some() {
            return Ok(None);
        }
        self.insert(n).await.map(Some)
    }

    /// All notifications for a user, newest first.
    pub async fn for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>, DbError> {
        let query = format!(
            "{SELECT_WITH_ACTOR} WHERE n.recipient_id = ? ORDER BY n.created_at DESC, n.rowid DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(into_record).collect())
    }

    /// Unread notifications for a user, newest first.
    pub async fn unread_for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>, DbError> {
        let query = format!(
            "{SELECT_WITH_ACTOR} WHERE n.recipient_id = ? AND n.is_read = 0 \
             ORDER BY n.created_at DESC, n.rowid DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(into_record).collect())
    }

    /// Mark one of the user's notifications read. Returns false when it is not theirs.
    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> Result<bool, DbError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND recipient_id = ?")
                .bind(notification_id)
                .bind(user_id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete one of the user's notifications. Returns false when it is not theirs.
    pub async fn delete(&self, notification_id: &str, user_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND recipient_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove unread notifications of `kind` from `actor_id` to `recipient_id`
    /// that refer to `entity_id`.
    pub async fn retract_unread(
        &self,
        actor_id: &str,
        recipient_id: &str,
        kind: &str,
        entity_id: Option<&str>,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE actor_id = ? AND recipient_id = ? AND kind = ? AND entity_id IS ?
              AND is_read = 0
            "#,
        )
        .bind(actor_id)
        .bind(recipient_id)
        .bind(kind)
        .bind(entity_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn into_record(row: NotificationRow) -> NotificationRecord {
    let (
        id,
        kind,
        message,
        actor_id,
        first_name,
        last_name,
        nickname,
        avatar,
        group_id,
        entity_id,
        entity_type,
        is_read,
        created_at,
    ) = row;
    NotificationRecord {
        id,
        kind,
        message,
        actor: ActorSummary {
            id: actor_id,
            first_name,
            last_name,
            nickname,
            avatar,
        },
        group_id,
        entity_id,
        entity_type,
        is_read,
        created_at,
    }
}
