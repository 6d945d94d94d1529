// Notification repository

use super::queries::notification_queries::SELECT_ALL_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{NewNotification, Notification};
use chrono::Utc;
use tracing::instrument;

/// In-app messages shown on the updates page
#[derive(Clone)]
pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, notification), fields(recipient = notification.recipient_user_id))]
    pub async fn create(&self, notification: &NewNotification) -> Result<i64, DatabaseError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (recipient_user_id, sender_type, sender_label, title, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(notification.recipient_user_id)
        .bind(&notification.sender_type)
        .bind(&notification.sender_label)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(Utc::now().timestamp())
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(notification_id = id, "Notification created");
        Ok(id)
    }

    /// Newest first; `limit` of None returns everything
    #[instrument(skip(self))]
    pub async fn for_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>, DatabaseError> {
        let notifications = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE recipient_user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
            SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(self.pool.pool())
        .await?;
        Ok(count)
    }

    /// Mark one of the user's notifications read; already-read ones keep their time
    ///
    /// Returns whether a row changed.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET read_at = $3
            WHERE id = $1 AND recipient_user_id = $2 AND read_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now().timestamp())
        .execute(self.pool.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $2 WHERE recipient_user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .bind(Utc::now().timestamp())
        .execute(self.pool.pool())
        .await?;

        tracing::debug!(
            user_id = user_id,
            updated = result.rows_affected(),
            "Notifications marked read"
        );
        Ok(result.rows_affected())
    }
}
