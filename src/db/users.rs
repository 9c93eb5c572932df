//! User profile lookups.

use super::{DbError, now};
use crate::protocol::ActorSummary;
use sqlx::SqlitePool;

/// Profile fields for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub nickname: &'a str,
    pub avatar: &'a str,
    pub is_public: bool,
}

/// Repository for user profiles.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user. Profiles are owned by the REST layer; the hub only reads them.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, nickname, avatar, is_public, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.nickname)
        .bind(user.avatar)
        .bind(user.is_public)
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn exists(&self, user_id: &str) -> Result<bool, DbError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Whether the profile is public. `None` when the user does not exist.
    pub async fn is_public(&self, user_id: &str) -> Result<Option<bool>, DbError> {
        let public: Option<bool> = sqlx::query_scalar("SELECT is_public FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(public)
    }

    /// Public profile fields attached to notifications.
    pub async fn summary(&self, user_id: &str) -> Result<Option<ActorSummary>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, String, String)>(
            r#"
            SELECT id, first_name, last_name, nickname, avatar
            FROM users WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(
            |(id, first_name, last_name, nickname, avatar)| ActorSummary {
                id,
                first_name,
                last_name,
                nickname,
                avatar,
            },
        ))
    }
}
