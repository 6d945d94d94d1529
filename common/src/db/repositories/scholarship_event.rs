// Funnel event repository

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::EventType;
use chrono::{DateTime, Utc};
use tracing::instrument;

/// At most one event per (user, scholarship, event type)
#[derive(Clone)]
pub struct ScholarshipEventRepository {
    pool: DbPool,
}

impl ScholarshipEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record an event unless it was already recorded; returns whether it was new
    #[instrument(skip(self))]
    pub async fn record(
        &self,
        user_id: i64,
        scholarship_key: &str,
        event: EventType,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO scholarship_events (user_id, scholarship_key, event_type, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, scholarship_key, event_type) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(scholarship_key)
        .bind(event.as_str())
        .bind(Utc::now().timestamp())
        .execute(self.pool.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record every event in order
    pub async fn record_all(
        &self,
        user_id: i64,
        scholarship_key: &str,
        events: &[EventType],
    ) -> Result<usize, DatabaseError> {
        let mut created = 0;
        for event in events {
            if self.record(user_id, scholarship_key, *event).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Distinct users with the event for a scholarship since the cutoff
    #[instrument(skip(self))]
    pub async fn count_users_since(
        &self,
        scholarship_key: &str,
        event: EventType,
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT user_id)
            FROM scholarship_events
            WHERE scholarship_key = $1 AND event_type = $2 AND created_at >= $3
            "#,
        )
        .bind(scholarship_key)
        .bind(event.as_str())
        .bind(since.timestamp())
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count)
    }
}
