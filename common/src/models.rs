use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Column helpers
// ============================================================================

/// Convert an epoch-seconds column into a UTC timestamp
pub(crate) fn timestamp(secs: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {}", secs).into()))
}

fn optional_timestamp(secs: Option<i64>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    secs.map(timestamp).transpose()
}

/// Flags are stored as 0/1 integers on both backends
pub(crate) fn flag_value(flag: bool) -> i64 {
    i64::from(flag)
}

fn flag(row: &AnyRow, column: &str) -> Result<bool, sqlx::Error> {
    row.try_get::<i64, _>(column).map(|v| v != 0)
}

fn json_list(raw: &str) -> Result<Vec<String>, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl<'r> FromRow<'r, AnyRow> for User {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            profile_image: row.try_get("profile_image")?,
            created_at: timestamp(row.try_get("created_at")?)?,
        })
    }
}

/// Validated registration data, password already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
}

/// JWT claims stored in the session cookie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub sub: String, // user id
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl SessionClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

// ============================================================================
// Contact inquiries and scholarship submissions
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Inquiry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    pub ip: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, AnyRow> for Inquiry {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            subject: row.try_get("subject")?,
            message: row.try_get("message")?,
            ip: row.try_get("ip")?,
            created_at: timestamp(row.try_get("created_at")?)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewInquiry {
    pub user_id: Option<i64>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScholarshipSubmission {
    pub id: i64,
    pub user_id: i64,
    pub scholarship_name: String,
    pub interest_area: String,
    pub has_submitted: bool,
    pub notes: Option<String>,
    pub ip: String,
    pub created_at: DateTime<Utc>,
    /// Submitter email, filled by joined admin queries
    pub user_email: Option<String>,
}

impl<'r> FromRow<'r, AnyRow> for ScholarshipSubmission {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            scholarship_name: row.try_get("scholarship_name")?,
            interest_area: row.try_get("interest_area")?,
            has_submitted: flag(row, "has_submitted")?,
            notes: row.try_get("notes")?,
            ip: row.try_get("ip")?,
            created_at: timestamp(row.try_get("created_at")?)?,
            user_email: row.try_get("user_email").ok(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub user_id: i64,
    pub scholarship_name: String,
    pub interest_area: String,
    pub has_submitted: bool,
    pub notes: Option<String>,
    pub ip: String,
}

// ============================================================================
// Questionnaire
// ============================================================================

/// The answers a user gives in the matching questionnaire
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuestionnaireAnswers {
    pub study_status: String,
    pub study_field: String,
    pub institution: String,
    pub military_status: String,
    pub populations: Vec<String>,
    pub work_status: String,
    pub volunteer_willingness: String,
    pub scholarship_duration_preference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Questionnaire {
    pub id: i64,
    pub user_id: i64,
    #[serde(flatten)]
    pub answers: QuestionnaireAnswers,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, AnyRow> for Questionnaire {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let populations: String = row.try_get("populations")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            answers: QuestionnaireAnswers {
                study_status: row.try_get("study_status")?,
                study_field: row.try_get("study_field")?,
                institution: row.try_get("institution")?,
                military_status: row.try_get("military_status")?,
                populations: json_list(&populations)?,
                work_status: row.try_get("work_status")?,
                volunteer_willingness: row.try_get("volunteer_willingness")?,
                scholarship_duration_preference: row
                    .try_get("scholarship_duration_preference")?,
            },
            submitted_at: timestamp(row.try_get("submitted_at")?)?,
            updated_at: timestamp(row.try_get("updated_at")?)?,
        })
    }
}

// ============================================================================
// Tracked scholarships
// ============================================================================

/// Where a user stands with a matched scholarship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScholarshipStatus {
    #[default]
    Interested,
    Applied,
    NotInterested,
    Accepted,
}

impl ScholarshipStatus {
    pub const ALL: [ScholarshipStatus; 4] = [
        ScholarshipStatus::Applied,
        ScholarshipStatus::Interested,
        ScholarshipStatus::NotInterested,
        ScholarshipStatus::Accepted,
    ];

    /// Statuses that count as showing interest
    pub const INTERESTED: [ScholarshipStatus; 3] = [
        ScholarshipStatus::Interested,
        ScholarshipStatus::Applied,
        ScholarshipStatus::Accepted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScholarshipStatus::Interested => "interested",
            ScholarshipStatus::Applied => "applied",
            ScholarshipStatus::NotInterested => "not_interested",
            ScholarshipStatus::Accepted => "accepted",
        }
    }

    /// Hebrew label shown in the UI and sent to external consumers
    pub fn label(&self) -> &'static str {
        match self {
            ScholarshipStatus::Interested => "מעוניין",
            ScholarshipStatus::Applied => "הגשתי",
            ScholarshipStatus::NotInterested => "לא מעוניין",
            ScholarshipStatus::Accepted => "התקבלתי",
        }
    }

    /// Dashboard ordering, lowest first
    pub fn priority(&self) -> u8 {
        match self {
            ScholarshipStatus::Accepted => 1,
            ScholarshipStatus::Applied => 2,
            ScholarshipStatus::Interested => 3,
            ScholarshipStatus::NotInterested => 5,
        }
    }

    /// Events implied by moving into this status
    pub fn implied_events(&self) -> &'static [EventType] {
        match self {
            ScholarshipStatus::Interested => &[EventType::Interest],
            ScholarshipStatus::Applied => &[EventType::Interest, EventType::Application],
            ScholarshipStatus::Accepted => &[
                EventType::Interest,
                EventType::Application,
                EventType::Acceptance,
            ],
            ScholarshipStatus::NotInterested => &[EventType::NotInterested],
        }
    }
}

impl fmt::Display for ScholarshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScholarshipStatus {
    type Err = String;

    /// Accepts the stored code or the Hebrew label
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s || status.label() == s)
            .ok_or_else(|| format!("unknown scholarship status: {}", s))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserScholarship {
    pub id: i64,
    pub user_id: i64,
    pub scholarship_key: String,
    pub scholarship_title: String,
    pub scholarship_link: Option<String>,
    pub match_score: i64,
    pub match_reasons: Vec<String>,
    pub status: ScholarshipStatus,
    pub status_label: &'static str,
    pub alerts_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, AnyRow> for UserScholarship {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = ScholarshipStatus::from_str(&status)
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let reasons: String = row.try_get("match_reasons")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            scholarship_key: row.try_get("scholarship_key")?,
            scholarship_title: row.try_get("scholarship_title")?,
            scholarship_link: row.try_get("scholarship_link")?,
            match_score: row.try_get("match_score")?,
            match_reasons: json_list(&reasons)?,
            status,
            status_label: status.label(),
            alerts_enabled: flag(row, "alerts_enabled")?,
            created_at: timestamp(row.try_get("created_at")?)?,
            updated_at: timestamp(row.try_get("updated_at")?)?,
        })
    }
}

/// A scored catalogue entry for one user, before it is persisted
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredMatch {
    pub key: String,
    pub title: String,
    pub link: Option<String>,
    pub score: i64,
    pub reasons: Vec<String>,
}

/// One row of the external alerts feed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertFeedEntry {
    pub user_email: String,
    pub user_phone: String,
    pub scholarship_title: String,
    pub scholarship_link: Option<String>,
    pub status: String,
}

impl<'r> FromRow<'r, AnyRow> for AlertFeedEntry {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let label = ScholarshipStatus::from_str(&status)
            .map(|s| s.label().to_string())
            .unwrap_or(status);
        Ok(Self {
            user_email: row.try_get("user_email")?,
            user_phone: row.try_get("user_phone")?,
            scholarship_title: row.try_get("scholarship_title")?,
            scholarship_link: row.try_get("scholarship_link")?,
            status: label,
        })
    }
}

// ============================================================================
// Funnel events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "interest_event")]
    Interest,
    #[serde(rename = "application_event")]
    Application,
    #[serde(rename = "acceptance_event")]
    Acceptance,
    #[serde(rename = "not_interested_event")]
    NotInterested,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Interest,
        EventType::Application,
        EventType::Acceptance,
        EventType::NotInterested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Interest => "interest_event",
            EventType::Application => "application_event",
            EventType::Acceptance => "acceptance_event",
            EventType::NotInterested => "not_interested_event",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {}", s))
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_user_id: i64,
    pub sender_type: String,
    pub sender_label: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

impl<'r> FromRow<'r, AnyRow> for Notification {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            recipient_user_id: row.try_get("recipient_user_id")?,
            sender_type: row.try_get("sender_type")?,
            sender_label: row.try_get("sender_label")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            created_at: timestamp(row.try_get("created_at")?)?,
            read_at: optional_timestamp(row.try_get("read_at")?)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_user_id: i64,
    pub sender_type: String,
    pub sender_label: String,
    pub title: String,
    pub body: String,
}

impl NewNotification {
    /// A message written by the administrator
    pub fn from_admin(recipient_user_id: i64, title: &str, body: &str) -> Self {
        Self {
            recipient_user_id,
            sender_type: "admin".to_string(),
            sender_label: "מנהל".to_string(),
            title: title.trim().to_string(),
            body: body.trim().to_string(),
        }
    }
}

// ============================================================================
// Login throttling and job bookkeeping
// ============================================================================

#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub id: i64,
    pub email: String,
    pub ip: String,
    pub attempts: i64,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, AnyRow> for LoginAttempt {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            ip: row.try_get("ip")?,
            attempts: row.try_get("attempts")?,
            last_failed_at: optional_timestamp(row.try_get("last_failed_at")?)?,
            locked_until: optional_timestamp(row.try_get("locked_until")?)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DailyJobRun {
    pub id: i64,
    pub job_name: String,
    pub last_run_date: Option<chrono::NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, AnyRow> for DailyJobRun {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let last_run_date: Option<String> = row.try_get("last_run_date")?;
        let last_run_date = last_run_date
            .map(|d| chrono::NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            id: row.try_get("id")?,
            job_name: row.try_get("job_name")?,
            last_run_date,
            updated_at: timestamp(row.try_get("updated_at")?)?,
        })
    }
}
