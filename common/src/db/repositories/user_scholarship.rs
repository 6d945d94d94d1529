// Tracked scholarship repository

use super::queries::{status_list, user_scholarship_queries::SELECT_ALL_COLUMNS};
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{
    flag_value, AlertFeedEntry, ScholarshipStatus, ScoredMatch, UserScholarship,
};
use chrono::Utc;
use tracing::instrument;

/// Repository for the per-user scholarship tracking rows
#[derive(Clone)]
pub struct UserScholarshipRepository {
    pool: DbPool,
}

impl UserScholarshipRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert new matches and refresh the score of existing ones
    ///
    /// Rows that already exist keep their status and alert preference; new
    /// rows start as `interested` with alerts off. Runs in one transaction.
    #[instrument(skip(self, matches), fields(count = matches.len()))]
    pub async fn upsert_matches(
        &self,
        user_id: i64,
        matches: &[ScoredMatch],
    ) -> Result<usize, DatabaseError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.pool().begin().await?;

        for m in matches {
            let reasons = serde_json::to_string(&m.reasons)
                .map_err(|e| DatabaseError::Decode(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO user_scholarships (
                    user_id, scholarship_key, scholarship_title, scholarship_link,
                    match_score, match_reasons, status, alerts_enabled,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (user_id, scholarship_key) DO UPDATE SET
                    scholarship_title = excluded.scholarship_title,
                    scholarship_link = excluded.scholarship_link,
                    match_score = excluded.match_score,
                    match_reasons = excluded.match_reasons,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(user_id)
            .bind(&m.key)
            .bind(&m.title)
            .bind(&m.link)
            .bind(m.score)
            .bind(reasons)
            .bind(ScholarshipStatus::default().as_str())
            .bind(flag_value(false))
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(user_id = user_id, count = matches.len(), "Matches upserted");
        Ok(matches.len())
    }

    /// All rows for a user, best match first
    #[instrument(skip(self))]
    pub async fn find_by_user(&self, user_id: i64) -> Result<Vec<UserScholarship>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserScholarship>(&format!(
            r#"
            SELECT {}
            FROM user_scholarships
            WHERE user_id = $1
            ORDER BY match_score DESC, updated_at DESC, id
            "#,
            SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    /// Scored rows ordered for the dashboard
    ///
    /// Accepted, applied, interested, anything else, then not interested;
    /// ties broken by score and recency.
    #[instrument(skip(self))]
    pub async fn dashboard_top(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<UserScholarship>, DatabaseError> {
        let priority = format!(
            "CASE status WHEN '{}' THEN 1 WHEN '{}' THEN 2 WHEN '{}' THEN 3 WHEN '{}' THEN 5 ELSE 4 END",
            ScholarshipStatus::Accepted.as_str(),
            ScholarshipStatus::Applied.as_str(),
            ScholarshipStatus::Interested.as_str(),
            ScholarshipStatus::NotInterested.as_str(),
        );
        let rows = sqlx::query_as::<_, UserScholarship>(&format!(
            r#"
            SELECT {}
            FROM user_scholarships
            WHERE user_id = $1 AND match_score > 0
            ORDER BY {} ASC, match_score DESC, updated_at DESC
            LIMIT $2
            "#,
            SELECT_ALL_COLUMNS, priority
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    /// A row by id, only when it belongs to the user
    #[instrument(skip(self))]
    pub async fn find_for_user(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<UserScholarship>, DatabaseError> {
        let row = sqlx::query_as::<_, UserScholarship>(&format!(
            "SELECT {} FROM user_scholarships WHERE id = $1 AND user_id = $2",
            SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row)
    }

    /// Change status and alert preference of a user's row
    ///
    /// Returns the row as it was before the update, or None when the row does
    /// not exist or belongs to someone else.
    #[instrument(skip(self))]
    pub async fn update_tracking(
        &self,
        id: i64,
        user_id: i64,
        status: ScholarshipStatus,
        alerts_enabled: bool,
    ) -> Result<Option<UserScholarship>, DatabaseError> {
        let Some(previous) = self.find_for_user(id, user_id).await? else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE user_scholarships
            SET status = $3, alerts_enabled = $4, updated_at = $5
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(status.as_str())
        .bind(flag_value(alerts_enabled))
        .bind(Utc::now().timestamp())
        .execute(self.pool.pool())
        .await?;

        tracing::info!(
            user_id = user_id,
            scholarship_key = %previous.scholarship_key,
            from = %previous.status,
            to = %status,
            "Scholarship tracking updated"
        );
        Ok(Some(previous))
    }

    /// Distinct users holding at least one row in one of the statuses
    #[instrument(skip(self))]
    pub async fn user_ids_with_status(
        &self,
        statuses: &[ScholarshipStatus],
    ) -> Result<Vec<i64>, DatabaseError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT user_id FROM user_scholarships WHERE status IN ({}) ORDER BY user_id",
            status_list(statuses)
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(ids)
    }

    /// Distinct users currently in one of the statuses for a scholarship
    #[instrument(skip(self))]
    pub async fn count_users_with_status(
        &self,
        scholarship_key: &str,
        statuses: &[ScholarshipStatus],
    ) -> Result<i64, DatabaseError> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(DISTINCT user_id)
            FROM user_scholarships
            WHERE scholarship_key = $1 AND status IN ({})
            "#,
            status_list(statuses)
        ))
        .bind(scholarship_key)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count)
    }

    /// Rows with alerts enabled that the user has not dismissed
    #[instrument(skip(self))]
    pub async fn alerts_feed(&self) -> Result<Vec<AlertFeedEntry>, DatabaseError> {
        let rows = sqlx::query_as::<_, AlertFeedEntry>(
            r#"
            SELECT u.email AS user_email, u.phone AS user_phone,
                   us.scholarship_title, us.scholarship_link, us.status
            FROM user_scholarships us
            INNER JOIN users u ON u.id = us.user_id
            WHERE us.alerts_enabled = $1 AND us.status <> $2
            ORDER BY us.id
            "#,
        )
        .bind(flag_value(true))
        .bind(ScholarshipStatus::NotInterested.as_str())
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }
}
