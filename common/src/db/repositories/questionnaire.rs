// Questionnaire repository

use super::queries::questionnaire_queries::SELECT_ALL_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Questionnaire, QuestionnaireAnswers};
use chrono::Utc;
use tracing::instrument;

/// One questionnaire per user; saving again overwrites the answers
#[derive(Clone)]
pub struct QuestionnaireRepository {
    pool: DbPool,
}

impl QuestionnaireRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_user(&self, user_id: i64) -> Result<Option<Questionnaire>, DatabaseError> {
        let questionnaire = sqlx::query_as::<_, Questionnaire>(&format!(
            "SELECT {} FROM user_questionnaire WHERE user_id = $1",
            SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(questionnaire)
    }

    /// Insert or replace the user's answers, keeping the first submission time
    #[instrument(skip(self, answers))]
    pub async fn upsert(
        &self,
        user_id: i64,
        answers: &QuestionnaireAnswers,
    ) -> Result<Questionnaire, DatabaseError> {
        let populations = serde_json::to_string(&answers.populations)
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;
        let now = Utc::now().timestamp();

        let saved = sqlx::query_as::<_, Questionnaire>(&format!(
            r#"
            INSERT INTO user_questionnaire (
                user_id, study_status, study_field, institution, military_status,
                populations, work_status, volunteer_willingness,
                scholarship_duration_preference, submitted_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (user_id) DO UPDATE SET
                study_status = excluded.study_status,
                study_field = excluded.study_field,
                institution = excluded.institution,
                military_status = excluded.military_status,
                populations = excluded.populations,
                work_status = excluded.work_status,
                volunteer_willingness = excluded.volunteer_willingness,
                scholarship_duration_preference = excluded.scholarship_duration_preference,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .bind(&answers.study_status)
        .bind(&answers.study_field)
        .bind(&answers.institution)
        .bind(&answers.military_status)
        .bind(populations)
        .bind(&answers.work_status)
        .bind(&answers.volunteer_willingness)
        .bind(&answers.scholarship_duration_preference)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(user_id = user_id, "Questionnaire saved");
        Ok(saved)
    }
}
