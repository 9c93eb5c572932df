//! Session lookups backing cookie authentication.

use super::{DbError, new_id, now};
use sqlx::SqlitePool;

/// Repository for login sessions.
pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a session valid for `ttl_secs`, returning its token.
    pub async fn create(&self, user_id: &str, ttl_secs: i64) -> Result<String, DbError> {
        let id = new_id();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(user_id)
            .bind(now() + ttl_secs)
            .execute(self.pool)
            .await?;
        Ok(id)
    }

    /// Resolve an unexpired session token to its user.
    pub async fn user_for(&self, session_id: &str) -> Result<Option<String>, DbError> {
        let user_id: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM sessions WHERE id = ? AND expires_at > ?")
                .bind(session_id)
                .bind(now())
                .fetch_optional(self.pool)
                .await?;
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::seeded;

    #[tokio::test]
    async fn expired_sessions_do_not_resolve() {
        let db = seeded().await;
        let live = db.sessions().create("alice", 3600).await.expect("create");
        let stale = db.sessions().create("bob", -1).await.expect("create");

        assert_eq!(db.sessions().user_for(&live).await.expect("query").as_deref(), Some("alice"));
        assert_eq!(db.sessions().user_for(&stale).await.expect("query"), None);
        assert_eq!(db.sessions().user_for("bogus").await.expect("query"), None);
    }
}
