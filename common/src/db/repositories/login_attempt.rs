// Failed login bookkeeping per (email, ip)

use super::queries::login_attempt_queries::SELECT_ALL_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::LoginAttempt;
use chrono::{DateTime, Utc};
use tracing::instrument;

#[derive(Clone)]
pub struct LoginAttemptRepository {
    pool: DbPool,
}

impl LoginAttemptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find(&self, email: &str, ip: &str) -> Result<Option<LoginAttempt>, DatabaseError> {
        let attempt = sqlx::query_as::<_, LoginAttempt>(&format!(
            "SELECT {} FROM login_attempts WHERE email = $1 AND ip = $2",
            SELECT_ALL_COLUMNS
        ))
        .bind(email)
        .bind(ip)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(attempt)
    }

    /// Count one more failure, locking until `lock_until` once `threshold` is reached
    ///
    /// The counter is not reset when a lock expires, so a failure after an
    /// expired lock locks again immediately.
    #[instrument(skip(self))]
    pub async fn record_failure(
        &self,
        email: &str,
        ip: &str,
        now: DateTime<Utc>,
        threshold: i64,
        lock_until: DateTime<Utc>,
    ) -> Result<LoginAttempt, DatabaseError> {
        let attempt = sqlx::query_as::<_, LoginAttempt>(&format!(
            r#"
            INSERT INTO login_attempts (email, ip, attempts, last_failed_at, locked_until)
            VALUES ($1, $2, 1, $3, CASE WHEN 1 >= $4 THEN $5 ELSE NULL END)
            ON CONFLICT (email, ip) DO UPDATE SET
                attempts = login_attempts.attempts + 1,
                last_failed_at = excluded.last_failed_at,
                locked_until = CASE
                    WHEN login_attempts.attempts + 1 >= $4 THEN $5
                    ELSE login_attempts.locked_until
                END
            RETURNING {}
            "#,
            SELECT_ALL_COLUMNS
        ))
        .bind(email)
        .bind(ip)
        .bind(now.timestamp())
        .bind(threshold)
        .bind(lock_until.timestamp())
        .fetch_one(self.pool.pool())
        .await?;

        tracing::debug!(
            attempts = attempt.attempts,
            locked = attempt.locked_until.is_some(),
            "Login failure recorded"
        );
        Ok(attempt)
    }

    /// Clear the counter after a successful login
    #[instrument(skip(self))]
    pub async fn reset(&self, email: &str, ip: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE login_attempts
            SET attempts = 0, locked_until = NULL, last_failed_at = NULL
            WHERE email = $1 AND ip = $2
            "#,
        )
        .bind(email)
        .bind(ip)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }
}
