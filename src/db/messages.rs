//! Private and group chat history.

use super::{DbError, new_id, now};
use crate::protocol::{GroupMessageRecord, PrivateMessageRecord};
use sqlx::SqlitePool;

/// Maximum rows returned by a history load.
const HISTORY_LIMIT: i64 = 200;

/// Repository for chat messages and read markers.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a private message. `message` must already be escaped.
    pub async fn insert_private(
        &self,
        sender_id: &str,
        recipient_id: &str,
        message: &str,
    ) -> Result<PrivateMessageRecord, DbError> {
        let record = PrivateMessageRecord {
            id: new_id(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            message: message.to_string(),
            is_read: false,
            created_at: now(),
        };

        sqlx::query(
            r#"
            INSERT INTO private_messages (id, sender_id, recipient_id, message, is_read, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.sender_id)
        .bind(&record.recipient_id)
        .bind(&record.message)
        .bind(record.created_at)
        .execute(self.pool)
        .await?;

        Ok(record)
    }

    /// Conversation between two users, oldest first.
    pub async fn private_history(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<PrivateMessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, bool, i64)>(
            r#"
            SELECT id, sender_id, recipient_id, message, is_read, created_at FROM (
                SELECT id, sender_id, recipient_id, message, is_read, created_at, rowid AS seq
                FROM private_messages
                WHERE (sender_id = ? AND recipient_id = ?) OR (sender_id = ? AND recipient_id = ?)
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?
            ) ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .bind(HISTORY_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, sender_id, recipient_id, message, is_read, created_at)| PrivateMessageRecord {
                    id,
                    sender_id,
                    recipient_id,
                    message,
                    is_read,
                    created_at,
                },
            )
            .collect())
    }

    /// Mark every unread message from `sender_id` to `reader_id` as read.
    pub async fn mark_private_read(
        &self,
        reader_id: &str,
        sender_id: &str,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE private_messages SET is_read = 1
            WHERE recipient_id = ? AND sender_id = ? AND is_read = 0
            "#,
        )
        .bind(reader_id)
        .bind(sender_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Store a group message. `message` must already be escaped.
    pub async fn insert_group(
        &self,
        group_id: &str,
        sender_id: &str,
        message: &str,
    ) -> Result<GroupMessageRecord, DbError> {
        let id = new_id();
        let created_at = now();

        sqlx::query(
            r#"
            INSERT INTO group_messages (id, group_id, sender_id, message, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(group_id)
        .bind(sender_id)
        .bind(message)
        .bind(created_at)
        .execute(self.pool)
        .await?;

        let sender_nickname: String =
            sqlx::query_scalar("SELECT nickname FROM users WHERE id = ?")
                .bind(sender_id)
                .fetch_optional(self.pool)
                .await?
                .unwrap_or_default();

        Ok(GroupMessageRecord {
            id,
            group_id: group_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_nickname,
            message: message.to_string(),
            created_at,
        })
    }

    /// Group conversation, oldest first.
    pub async fn group_history(&self, group_id: &str) -> Result<Vec<GroupMessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, i64)>(
            r#"
            SELECT id, group_id, sender_id, nickname, message, created_at FROM (
                SELECT m.id, m.group_id, m.sender_id, COALESCE(u.nickname, '') AS nickname,
                       m.message, m.created_at, m.rowid AS seq
                FROM group_messages m
                LEFT JOIN users u ON u.id = m.sender_id
                WHERE m.group_id = ?
                ORDER BY m.created_at DESC, m.rowid DESC
                LIMIT ?
            ) ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(group_id)
        .bind(HISTORY_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, group_id, sender_id, sender_nickname, message, created_at)| {
                    GroupMessageRecord {
                        id,
                        group_id,
                        sender_id,
                        sender_nickname,
                        message,
                        created_at,
                    }
                },
            )
            .collect())
    }

    /// Record that `user_id` has read the group up to now.
    pub async fn mark_group_read(&self, group_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO group_message_reads (group_id, user_id, last_read_at)
            VALUES (?, ?, ?)
            ON CONFLICT (group_id, user_id) DO UPDATE SET last_read_at = excluded.last_read_at
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Messages in the group newer than the user's read marker.
    pub async fn unread_group_count(&self, group_id: &str, user_id: &str) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM group_messages m
            WHERE m.group_id = ? AND m.sender_id != ?
              AND m.created_at > COALESCE(
                  (SELECT last_read_at FROM group_message_reads WHERE group_id = ? AND user_id = ?),
                  -1)
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(group_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}
