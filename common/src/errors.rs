// Error handling framework

use std::collections::BTreeMap;
use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No next execution time available for {schedule_type} schedule")]
    NoNextExecution { schedule_type: String },
}

/// Authentication and authorization errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account temporarily locked for {remaining_minutes} minutes")]
    Locked { remaining_minutes: i64 },

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Session expired")]
    TokenExpired,

    #[error("Admin access required")]
    Forbidden,

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Form validation errors, keyed by field name
#[derive(Error, Debug, Default, Clone, PartialEq)]
#[error("Validation failed: {}", .fields.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct ValidationError {
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.add(field, message);
        err
    }

    /// Record the first error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Ok when no field failed
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt column value: {0}")]
    Decode(String),
}

/// Notion data source errors
#[derive(Error, Debug)]
pub enum NotionError {
    #[error("Notion credentials are not configured")]
    NotConfigured,

    #[error("Notion request failed: {0}")]
    Request(String),

    #[error("Notion returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Notion response could not be parsed: {0}")]
    Parse(String),
}

impl NotionError {
    /// Message shown to end users
    pub fn user_message(&self) -> &'static str {
        match self {
            NotionError::NotConfigured => "חסרים פרטי חיבור למערכת המלגות.",
            _ => "לא הצלחנו לטעון את המלגות כרגע.",
        }
    }
}

/// Make.com webhook errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid event_title: {0}")]
    InvalidEvent(String),

    #[error("html must be non-empty")]
    EmptyHtml,

    #[error("email must be non-empty")]
    EmptyEmail,

    #[error("Make webhook failed: status={status} body={body}")]
    Status { status: u16, body: String },

    #[error("Make webhook error: {0}")]
    Request(String),
}

/// Digest job errors
#[derive(Error, Debug)]
pub enum DigestError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Spreadsheet export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to build workbook: {0}")]
    Workbook(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to write export file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::Workbook(err.to_string())
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // Postgres reports SQLSTATE 23505; SQLite reports extended code 2067/1555
                if db_err.is_unique_violation() {
                    return DatabaseError::DuplicateKey(db_err.message().to_string());
                }
                match db_err.code().as_deref() {
                    Some("23505") | Some("2067") | Some("1555") => {
                        DatabaseError::DuplicateKey(db_err.message().to_string())
                    }
                    _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                }
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DatabaseError::Decode(format!("column {}: {}", index, source))
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}
