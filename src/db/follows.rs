//! Follow graph edges.

use super::{DbError, now, parse_status};
use crate::protocol::RequestStatus;
use sqlx::SqlitePool;

/// Repository for `user_follows` edges (follower -> following).
pub struct FollowRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FollowRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Status of the edge from `follower` to `following`, if any.
    pub async fn status(
        &self,
        follower: &str,
        following: &str,
    ) -> Result<Option<RequestStatus>, DbError> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT status FROM user_follows WHERE follower_id = ? AND following_id = ?",
        )
        .bind(follower)
        .bind(following)
        .fetch_optional(self.pool)
        .await?;

        raw.map(|s| parse_status("user_follows", &s)).transpose()
    }

    /// Create the edge or overwrite the status of an existing one.
    pub async fn upsert(
        &self,
        follower: &str,
        following: &str,
        status: RequestStatus,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO user_follows (follower_id, following_id, status, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (follower_id, following_id)
            DO UPDATE SET status = excluded.status, created_at = excluded.created_at
            "#,
        )
        .bind(follower)
        .bind(following)
        .bind(status.as_str())
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Move an edge from `from` to `to`. Returns false when no edge was in state `from`.
    pub async fn transition(
        &self,
        follower: &str,
        following: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE user_follows SET status = ?
            WHERE follower_id = ? AND following_id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(follower)
        .bind(following)
        .bind(from.as_str())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an edge currently in `status`. Returns false when none matched.
    pub async fn delete(
        &self,
        follower: &str,
        following: &str,
        status: RequestStatus,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "DELETE FROM user_follows WHERE follower_id = ? AND following_id = ? AND status = ?",
        )
        .bind(follower)
        .bind(following)
        .bind(status.as_str())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Accepted followers of `user_id`.
    pub async fn followers(&self, user_id: &str) -> Result<Vec<String>, DbError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT follower_id FROM user_follows
            WHERE following_id = ? AND status = 'accepted'
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }
}
