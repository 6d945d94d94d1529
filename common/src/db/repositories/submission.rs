// Scholarship submission repository

use super::queries::submission_queries::SELECT_JOINED_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{flag_value, NewSubmission, ScholarshipSubmission};
use chrono::Utc;
use tracing::instrument;

#[derive(Clone)]
pub struct SubmissionRepository {
    pool: DbPool,
}

impl SubmissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, submission), fields(user_id = submission.user_id))]
    pub async fn create(&self, submission: &NewSubmission) -> Result<i64, DatabaseError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO scholarship_submissions
                (user_id, scholarship_name, interest_area, has_submitted, notes, ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(submission.user_id)
        .bind(&submission.scholarship_name)
        .bind(&submission.interest_area)
        .bind(flag_value(submission.has_submitted))
        .bind(&submission.notes)
        .bind(&submission.ip)
        .bind(Utc::now().timestamp())
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(submission_id = id, "Scholarship submission stored");
        Ok(id)
    }

    /// Newest submissions first, with the submitter's email
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<ScholarshipSubmission>, DatabaseError> {
        let submissions = sqlx::query_as::<_, ScholarshipSubmission>(&format!(
            r#"
            SELECT {}
            FROM scholarship_submissions s
            INNER JOIN users u ON u.id = s.user_id
            ORDER BY s.created_at DESC, s.id DESC
            "#,
            SELECT_JOINED_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(submissions)
    }

    #[instrument(skip(self))]
    pub async fn find_by_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<ScholarshipSubmission>, DatabaseError> {
        let submissions = sqlx::query_as::<_, ScholarshipSubmission>(&format!(
            r#"
            SELECT {}
            FROM scholarship_submissions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.user_id = $1
            ORDER BY s.created_at DESC, s.id DESC
            "#,
            SELECT_JOINED_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(submissions)
    }
}
