// User repository implementation

use super::queries::user_queries::SELECT_ALL_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{NewUser, User};
use chrono::Utc;
use tracing::instrument;

/// Repository for user-related database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    /// Create a new UserRepository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    ///
    /// # Errors
    /// Returns `DatabaseError::DuplicateKey` when the email is already registered
    #[instrument(skip(self, user), fields(email = %user.email))]
    pub async fn create(&self, user: &NewUser) -> Result<User, DatabaseError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (first_name, last_name, phone, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            SELECT_ALL_COLUMNS
        ))
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Utc::now().timestamp())
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(user_id = created.id, "User created");
        Ok(created)
    }

    /// Find a user by (already normalised) email
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            SELECT_ALL_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(user)
    }

    /// Find a user by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(user)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, DatabaseError> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    /// All users, newest first
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
            SELECT_ALL_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(users)
    }

    /// All users in id order, for exports
    #[instrument(skip(self))]
    pub async fn find_all_by_id(&self) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY id",
            SELECT_ALL_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(users)
    }

    /// Find users by id, preserving no particular order
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<User>, DatabaseError> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.find_by_id(*id).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    #[instrument(skip(self, password_hash))]
    pub async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        }

        tracing::info!(user_id = id, "Password updated");
        Ok(())
    }

    /// Store the static-relative path of a new profile image
    #[instrument(skip(self))]
    pub async fn update_profile_image(&self, id: i64, path: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET profile_image = $2 WHERE id = $1")
            .bind(id)
            .bind(path)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        }

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool.pool())
            .await?;
        Ok(count)
    }
}
