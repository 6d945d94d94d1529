// Daily job bookkeeping

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::DailyJobRun;
use chrono::{NaiveDate, Utc};
use tracing::instrument;

/// Remembers the last local date each daily job ran
#[derive(Clone)]
pub struct JobRunRepository {
    pool: DbPool,
}

impl JobRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find(&self, job_name: &str) -> Result<Option<DailyJobRun>, DatabaseError> {
        let run = sqlx::query_as::<_, DailyJobRun>(
            "SELECT id, job_name, last_run_date, updated_at FROM daily_job_runs WHERE job_name = $1",
        )
        .bind(job_name)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(run)
    }

    pub async fn last_run_date(&self, job_name: &str) -> Result<Option<NaiveDate>, DatabaseError> {
        Ok(self.find(job_name).await?.and_then(|run| run.last_run_date))
    }

    #[instrument(skip(self))]
    pub async fn mark_ran(&self, job_name: &str, date: NaiveDate) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO daily_job_runs (job_name, last_run_date, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_name) DO UPDATE SET
                last_run_date = excluded.last_run_date,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(job_name)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(Utc::now().timestamp())
        .execute(self.pool.pool())
        .await?;

        tracing::info!(job_name = job_name, date = %date, "Daily job run recorded");
        Ok(())
    }
}
