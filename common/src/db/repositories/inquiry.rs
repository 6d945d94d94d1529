// Contact inquiry repository

use super::queries::inquiry_queries::SELECT_ALL_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Inquiry, NewInquiry};
use chrono::Utc;
use tracing::instrument;

#[derive(Clone)]
pub struct InquiryRepository {
    pool: DbPool,
}

impl InquiryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, inquiry), fields(email = %inquiry.email))]
    pub async fn create(&self, inquiry: &NewInquiry) -> Result<i64, DatabaseError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO inquiries (user_id, full_name, email, phone, subject, message, ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(inquiry.user_id)
        .bind(&inquiry.full_name)
        .bind(&inquiry.email)
        .bind(&inquiry.phone)
        .bind(&inquiry.subject)
        .bind(&inquiry.message)
        .bind(&inquiry.ip)
        .bind(Utc::now().timestamp())
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(inquiry_id = id, "Inquiry stored");
        Ok(id)
    }

    /// Newest inquiries first
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Inquiry>, DatabaseError> {
        let inquiries = sqlx::query_as::<_, Inquiry>(&format!(
            "SELECT {} FROM inquiries ORDER BY created_at DESC, id DESC",
            SELECT_ALL_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(inquiries)
    }

    #[instrument(skip(self))]
    pub async fn find_by_user(&self, user_id: i64) -> Result<Vec<Inquiry>, DatabaseError> {
        let inquiries = sqlx::query_as::<_, Inquiry>(&format!(
            "SELECT {} FROM inquiries WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(inquiries)
    }
}
