//! Group events and attendance.

use super::{DbError, new_id, now};
use crate::protocol::RsvpStatus;
use sqlx::SqlitePool;

/// An event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: String,
    pub group_id: String,
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Unix seconds.
    pub event_time: i64,
}

/// Repository for events.
pub struct EventRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EventRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether this creator already created an event with the same title and time in the group.
    pub async fn exists_identical(
        &self,
        group_id: &str,
        creator_id: &str,
        title: &str,
        event_time: i64,
    ) -> Result<bool, DbError> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM events
            WHERE group_id = ? AND creator_id = ? AND title = ? AND event_time = ?
            "#,
        )
        .bind(group_id)
        .bind(creator_id)
        .bind(title)
        .bind(event_time)
        .fetch_optional(self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn create(
        &self,
        group_id: &str,
        creator_id: &str,
        title: &str,
        description: &str,
        location: &str,
        event_time: i64,
    ) -> Result<EventRecord, DbError> {
        let record = EventRecord {
            id: new_id(),
            group_id: group_id.to_string(),
            creator_id: creator_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            location: location.to_string(),
            event_time,
        };

        sqlx::query(
            r#"
            INSERT INTO events
                (id, group_id, creator_id, title, description, location, event_time, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.group_id)
        .bind(&record.creator_id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.location)
        .bind(record.event_time)
        .bind(now())
        .execute(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn find(&self, event_id: &str) -> Result<Option<EventRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, String, String, String, i64)>(
            r#"
            SELECT id, group_id, creator_id, title, description, location, event_time
            FROM events WHERE id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(
            |(id, group_id, creator_id, title, description, location, event_time)| EventRecord {
                id,
                group_id,
                creator_id,
                title,
                description,
                location,
                event_time,
            },
        ))
    }

    /// Record (or change) a user's answer.
    pub async fn set_attendance(
        &self,
        event_id: &str,
        user_id: &str,
        status: RsvpStatus,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO event_attendance (event_id, user_id, status, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (event_id, user_id)
            DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status.as_str())
        .bind(now())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Users who answered `going`.
    pub async fn attendees(&self, event_id: &str) -> Result<Vec<String>, DbError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM event_attendance
            WHERE event_id = ? AND status = 'going'
            ORDER BY user_id
            "#,
        )
        .bind(event_id)
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }
}
