//! Groups, memberships, join requests and invitations.

use super::{DbError, now, parse_status};
use crate::protocol::{Decision, RequestStatus};
use sqlx::SqlitePool;

/// A group row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub admin_id: String,
}

/// Repository for the group table family.
pub struct GroupRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GroupRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a group with its admin as the first member.
    pub async fn create(
        &self,
        id: &str,
        title: &str,
        description: &str,
        admin_id: &str,
    ) -> Result<GroupRecord, DbError> {
        let ts = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO groups (id, title, description, admin_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(admin_id)
        .bind(ts)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(admin_id)
            .bind(ts)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(GroupRecord {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            admin_id: admin_id.to_string(),
        })
    }

    pub async fn find(&self, group_id: &str) -> Result<Option<GroupRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT id, title, description, admin_id FROM groups WHERE id = ?",
        )
        .bind(group_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(into_record))
    }

    pub async fn find_by_title(&self, title: &str) -> Result<Option<GroupRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT id, title, description, admin_id FROM groups WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(into_record))
    }

    pub async fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool, DbError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM group_members WHERE group_id = ? AND user_id = ?")
                .bind(group_id)
                .bind(user_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Member ids of a group, in join order.
    pub async fn members(&self, group_id: &str) -> Result<Vec<String>, DbError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM group_members WHERE group_id = ? ORDER BY joined_at, user_id",
        )
        .bind(group_id)
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }

    /// Groups a user currently belongs to. Snapshotted when the user connects.
    pub async fn memberships_for(&self, user_id: &str) -> Result<Vec<String>, DbError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT group_id FROM group_members WHERE user_id = ? ORDER BY group_id",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Join requests
    // ------------------------------------------------------------------

    pub async fn join_request_status(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<RequestStatus>, DbError> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT status FROM group_join_requests WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        raw.map(|s| parse_status("group_join_requests", &s)).transpose()
    }

    /// Create a pending request, or reopen a declined one.
    pub async fn open_join_request(&self, group_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO group_join_requests (group_id, user_id, status, created_at)
            VALUES (?, ?, 'pending', ?)
            ON CONFLICT (group_id, user_id)
            DO UPDATE SET status = 'pending', created_at = excluded.created_at
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Answer a pending request; accepting also adds the member.
    ///
    /// Returns false when there was no pending request.
    pub async fn answer_join_request(
        &self,
        group_id: &str,
        user_id: &str,
        decision: Decision,
    ) -> Result<bool, DbError> {
        let ts = now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE group_join_requests SET status = ?
            WHERE group_id = ? AND user_id = ? AND status = 'pending'
            "#,
        )
        .bind(decision.as_status().as_str())
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        if decision == Decision::Accepted {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(group_id)
            .bind(user_id)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Withdraw a pending request. Returns false when none was pending.
    pub async fn cancel_join_request(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM group_join_requests
            WHERE group_id = ? AND user_id = ? AND status = 'pending'
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a member. Any join request is marked declined so it can be reopened.
    ///
    /// Returns false when the user was not a member.
    pub async fn leave(&self, group_id: &str, user_id: &str) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE group_join_requests SET status = 'declined' WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Invitations
    // ------------------------------------------------------------------

    pub async fn invitation_status(
        &self,
        group_id: &str,
        invitee_id: &str,
    ) -> Result<Option<RequestStatus>, DbError> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT status FROM group_invitations WHERE group_id = ? AND invitee_id = ?",
        )
        .bind(group_id)
        .bind(invitee_id)
        .fetch_optional(self.pool)
        .await?;
        raw.map(|s| parse_status("group_invitations", &s)).transpose()
    }

    /// Create a pending invitation, replacing any answered one.
    pub async fn invite(
        &self,
        group_id: &str,
        inviter_id: &str,
        invitee_id: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO group_invitations (group_id, inviter_id, invitee_id, status, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            ON CONFLICT (group_id, invitee_id)
            DO UPDATE SET inviter_id = excluded.inviter_id, status = 'pending',
                          created_at = excluded.created_at
            "#,
        )
        .bind(group_id)
        .bind(inviter_id)
        .bind(invitee_id)
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Answer a pending invitation; accepting also adds the member.
    ///
    /// Returns the inviter, or `None` when no invitation was pending.
    pub async fn answer_invitation(
        &self,
        group_id: &str,
        invitee_id: &str,
        decision: Decision,
    ) -> Result<Option<String>, DbError> {
        let ts = now();
        let mut tx = self.pool.begin().await?;

        let inviter: Option<String> = sqlx::query_scalar(
            r#"
            SELECT inviter_id FROM group_invitations
            WHERE group_id = ? AND invitee_id = ? AND status = 'pending'
            "#,
        )
        .bind(group_id)
        .bind(invitee_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(inviter) = inviter else {
            return Ok(None);
        };

        sqlx::query("UPDATE group_invitations SET status = ? WHERE group_id = ? AND invitee_id = ?")
            .bind(decision.as_status().as_str())
            .bind(group_id)
            .bind(invitee_id)
            .execute(&mut *tx)
            .await?;

        if decision == Decision::Accepted {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(group_id)
            .bind(invitee_id)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(inviter))
    }

    /// Withdraw a pending invitation. Returns false when none was pending.
    pub async fn cancel_invitation(
        &self,
        group_id: &str,
        invitee_id: &str,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM group_invitations
            WHERE group_id = ? AND invitee_id = ? AND status = 'pending'
            "#,
        )
        .bind(group_id)
        .bind(invitee_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn into_record(
    (id, title, description, admin_id): (String, String, String, String),
) -> GroupRecord {
    GroupRecord {
        id,
        title,
        description,
        admin_id,
    }
}
