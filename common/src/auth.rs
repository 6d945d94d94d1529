// Authentication: password hashing, session tokens and login throttling

use crate::config::AuthConfig;
use crate::db::repositories::{LoginAttemptRepository, UserRepository};
use crate::errors::{AuthError, DatabaseError};
use crate::models::{NewUser, SessionClaims, User};
use crate::telemetry;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{error, instrument};

/// JWT token service for the session cookie
#[derive(Clone)]
pub struct JwtService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    expiration_hours: i64,
}

impl JwtService {
    #[instrument(skip(secret))]
    pub fn new(secret: &str, expiration_hours: u64) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            expiration_hours: expiration_hours as i64,
        }
    }

    pub fn expiration_hours(&self) -> i64 {
        self.expiration_hours
    }

    /// Issue a session token for a user
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub fn encode_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            exp: (now + Duration::hours(self.expiration_hours)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "Failed to encode JWT token");
            AuthError::AuthenticationFailed(format!("Failed to encode token: {}", e))
        })
    }

    /// Decode and validate a session token
    #[instrument(skip(self, token))]
    pub fn decode_token(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data =
            decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                tracing::debug!(error = %e, "Rejected session token");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken(format!("Token validation failed: {}", e)),
                }
            })?;

        Ok(token_data.claims)
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        AuthError::AuthenticationFailed(format!("Password hashing failed: {}", e))
    })
}

/// False for malformed hashes as well as wrong passwords
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Case-insensitive comparison against the configured admin address
pub fn is_admin(email: Option<&str>, admin_email: Option<&str>) -> bool {
    match (email, admin_email) {
        (Some(email), Some(admin)) => {
            let email = email.trim().to_lowercase();
            !email.is_empty() && email == admin.trim().to_lowercase()
        }
        _ => false,
    }
}

/// Whole minutes left on a lock, rounded up the way users read it
pub fn remaining_minutes(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (locked_until - now).num_seconds().div_euclid(60) + 1
}

/// Per (email, ip) failed-login counter with a temporary lock
#[derive(Clone)]
pub struct LoginGuard {
    attempts: LoginAttemptRepository,
    threshold: i64,
    window: Duration,
}

impl LoginGuard {
    pub fn new(attempts: LoginAttemptRepository, threshold: i64, window_minutes: i64) -> Self {
        Self {
            attempts,
            threshold: threshold.max(1),
            window: Duration::minutes(window_minutes),
        }
    }

    /// Refuse while a lock is active
    #[instrument(skip(self))]
    pub async fn check(&self, email: &str, ip: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let attempt = self
            .attempts
            .find(email, ip)
            .await
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;

        match attempt.and_then(|a| a.locked_until) {
            Some(until) if until > now => Err(AuthError::Locked {
                remaining_minutes: remaining_minutes(until, now),
            }),
            _ => Ok(()),
        }
    }

    pub async fn record_failure(
        &self,
        email: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let attempt = self
            .attempts
            .record_failure(email, ip, now, self.threshold, now + self.window)
            .await?;
        telemetry::record_login_failure();
        if attempt.attempts >= self.threshold {
            tracing::warn!(attempts = attempt.attempts, "Login locked after repeated failures");
        }
        Ok(())
    }

    pub async fn reset(&self, email: &str, ip: &str) -> Result<(), DatabaseError> {
        self.attempts.reset(email, ip).await
    }
}

/// Registration, login and password changes
#[derive(Clone)]
pub struct AuthService {
    jwt: JwtService,
    users: UserRepository,
    guard: LoginGuard,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        jwt: JwtService,
        users: UserRepository,
        attempts: LoginAttemptRepository,
        config: &AuthConfig,
    ) -> Self {
        Self {
            jwt,
            users,
            guard: LoginGuard::new(
                attempts,
                config.lockout_threshold,
                config.lockout_window_minutes,
            ),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt work factor, mainly to keep tests fast
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Create an account from already validated fields
    ///
    /// # Errors
    /// `EmailTaken` when the email is registered
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        phone: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let new_user = NewUser {
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            phone: phone.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password, self.bcrypt_cost)?,
        };

        let user = self.users.create(&new_user).await.map_err(|e| match e {
            DatabaseError::DuplicateKey(_) => AuthError::EmailTaken(email.to_string()),
            other => AuthError::AuthenticationFailed(other.to_string()),
        })?;

        telemetry::record_registration();
        Ok(user)
    }

    /// Check credentials with lockout, returning the user and a session token
    ///
    /// # Errors
    /// `Locked` while the (email, ip) pair is locked, `InvalidCredentials` on a
    /// wrong email or password
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: &str,
    ) -> Result<(User, String), AuthError> {
        let now = Utc::now();
        self.guard.check(email, ip, now).await?;

        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;

        match user {
            Some(user) if verify_password(password, &user.password_hash) => {
                self.guard
                    .reset(email, ip)
                    .await
                    .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;
                let token = self.jwt.encode_token(&user)?;
                tracing::info!(user_id = user.id, "User logged in");
                Ok((user, token))
            }
            _ => {
                self.guard
                    .record_failure(email, ip, now)
                    .await
                    .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Resolve a session token to a live user
    pub async fn user_from_token(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.jwt.decode_token(token)?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| AuthError::InvalidToken("bad subject".to_string()))?;
        self.users
            .find_by_id(user_id)
            .await
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?
            .ok_or_else(|| AuthError::InvalidToken("unknown user".to_string()))
    }

    #[instrument(skip(self, new_password))]
    pub async fn change_password(&self, user_id: i64, new_password: &str) -> Result<(), AuthError> {
        let hash = hash_password(new_password, self.bcrypt_cost)?;
        self.users
            .update_password(user_id, &hash)
            .await
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))
    }
}
