// Form input validation
//
// Each form is deserialized from the raw request body, then `validate`
// returns the cleaned values or every field error at once. Messages are
// shown to users as-is.

use crate::errors::ValidationError;
use crate::models::{QuestionnaireAnswers, ScholarshipStatus};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

lazy_static! {
    static ref NAME_REGEX: Regex = Regex::new(r"^[A-Za-z\u{0590}-\u{05FF} ]+$").unwrap();
    static ref PHONE_LOCAL_REGEX: Regex = Regex::new(r"^05\d{8}$").unwrap();
    static ref PHONE_INTL_REGEX: Regex = Regex::new(r"^\+9725\d{8}$").unwrap();
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

const PASSWORD_DENYLIST: [&str; 6] = [
    "password",
    "1234567890",
    "qwerty12345",
    "iloveyou123",
    "admin12345",
    "letmein123",
];

pub const STUDY_STATUS_CHOICES: &[&str] = &["מכינה", "תואר ראשון", "תואר שני", "הנדסאי"];
pub const STUDY_FIELD_CHOICES: &[&str] = &[
    "הנדסה / מדעים מדויקים",
    "מדעי החברה / כלכלה / ניהול",
    "חינוך / מדעי הרוח",
    "רפואה / מקצועות הבריאות",
    "אחר",
];
pub const MILITARY_STATUS_CHOICES: &[&str] = &[
    "לפני שירות",
    "במהלך שירות",
    "חייל משוחרר",
    "שירות לאומי / אזרחי",
    "לא רלוונטי",
];
pub const POPULATION_CHOICES: &[&str] = &[
    "תושב פריפריה",
    "עולה חדש",
    "יוצא אתיופיה",
    "חרדי",
    "ערבי / דרוזי",
    "נכות מוכרת",
    "לא משתייך",
];
pub const WORK_STATUS_CHOICES: &[&str] = &["לא עובד", "עובד עד חצי משרה", "עובד יותר מחצי משרה"];
pub const VOLUNTEER_CHOICES: &[&str] = &[
    "לא",
    "כן, עד 50 שעות בשנה",
    "כן, עד 100 שעות בשנה",
    "כן, גם יותר",
];
pub const DURATION_CHOICES: &[&str] = &["חד-פעמית", "שנתית", "רב-שנתית", "לא משנה"];

const INVALID_CHOICE: &str = "בחירה לא תקינה";
const INVALID_EMAIL: &str = "אימייל לא תקין";
const INVALID_PHONE: &str = "מספר טלפון ישראלי לא תקין";
const PASSWORD_MISMATCH: &str = "אימות הסיסמה אינו תואם";
pub const EMAIL_TAKEN: &str = "האימייל כבר רשום במערכת";

// ============================================================================
// Field rules
// ============================================================================

/// `05XXXXXXXX` becomes `+9725XXXXXXXX`; the international form is kept
pub fn normalize_phone(value: &str) -> Option<String> {
    let value = value.trim();
    if PHONE_LOCAL_REGEX.is_match(value) {
        Some(format!("+972{}", &value[1..]))
    } else if PHONE_INTL_REGEX.is_match(value) {
        Some(value.to_string())
    } else {
        None
    }
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

pub fn is_valid_name(value: &str) -> bool {
    NAME_REGEX.is_match(value.trim())
}

/// Every unmet password rule, in a fixed order
pub fn password_problems(value: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if value.chars().count() < 10 {
        problems.push("הסיסמה חייבת להכיל לפחות 10 תווים");
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("הסיסמה חייבת להכיל אות גדולה");
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        problems.push("הסיסמה חייבת להכיל אות קטנה");
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        problems.push("הסיסמה חייבת להכיל ספרה");
    }
    if !value.chars().any(|c| !c.is_ascii_alphanumeric()) {
        problems.push("הסיסמה חייבת להכיל תו מיוחד");
    }
    if PASSWORD_DENYLIST.contains(&value.to_lowercase().as_str()) {
        problems.push("הסיסמה שנבחרה נפוצה מדי");
    }
    problems
}

/// Collects field errors while reading values
struct Checker {
    errors: ValidationError,
}

impl Checker {
    fn new() -> Self {
        Self {
            errors: ValidationError::new(),
        }
    }

    /// Trimmed value, or an error when blank
    fn required(&mut self, field: &str, value: &str, message: &str) -> String {
        let value = value.trim();
        if value.is_empty() {
            self.errors.add(field, message);
        }
        value.to_string()
    }

    fn length(&mut self, field: &str, value: &str, min: usize, max: usize, message: &str) {
        let len = value.chars().count();
        if !value.is_empty() && (len < min || len > max) {
            self.errors.add(field, message);
        }
    }

    fn max_length(&mut self, field: &str, value: &str, max: usize, message: &str) {
        if value.chars().count() > max {
            self.errors.add(field, message);
        }
    }

    fn name(&mut self, field: &str, value: &str, message: &str) {
        if !value.is_empty() && !is_valid_name(value) {
            self.errors.add(field, message);
        }
    }

    fn email(&mut self, field: &str, value: &str) -> String {
        let email = normalize_email(&self.required(field, value, "נא להזין אימייל"));
        if !email.is_empty() && !is_valid_email(&email) {
            self.errors.add(field, INVALID_EMAIL);
        }
        email
    }

    fn phone(&mut self, field: &str, value: &str) -> String {
        let raw = self.required(field, value, "נא להזין טלפון");
        if raw.is_empty() {
            return raw;
        }
        normalize_phone(&raw).unwrap_or_else(|| {
            self.errors.add(field, INVALID_PHONE);
            raw
        })
    }

    fn password(&mut self, field: &str, value: &str, required_message: &str) {
        if value.is_empty() {
            self.errors.add(field, required_message);
            return;
        }
        let problems = password_problems(value);
        if !problems.is_empty() {
            self.errors.add(field, problems.join("; "));
        }
    }

    fn choice(
        &mut self,
        field: &str,
        value: &str,
        choices: &[&str],
        required_message: &str,
    ) -> String {
        let value = self.required(field, value, required_message);
        if !value.is_empty() && !choices.contains(&value.as_str()) {
            self.errors.add(field, INVALID_CHOICE);
        }
        value
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        self.errors.into_result(value)
    }
}

// ============================================================================
// Forms
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub confirm_password: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
}

impl RegisterForm {
    /// Email uniqueness is checked against the database by the caller
    pub fn validate(&self) -> Result<Registration, ValidationError> {
        let mut c = Checker::new();

        let first_name = c.required("first_name", &self.first_name, "נא להזין שם פרטי");
        c.length("first_name", &first_name, 2, 30, "שם פרטי חייב להיות בין 2 ל-30 תווים");
        c.name("first_name", &first_name, "שם פרטי יכול להכיל רק אותיות ורווחים");

        let last_name = c.required("last_name", &self.last_name, "נא להזין שם משפחה");
        c.length("last_name", &last_name, 2, 30, "שם משפחה חייב להיות בין 2 ל-30 תווים");
        c.name("last_name", &last_name, "שם משפחה יכול להכיל רק אותיות ורווחים");

        let phone = c.phone("phone", &self.phone);
        let email = c.email("email", &self.email);
        c.password("password", &self.password, "נא להזין סיסמה");

        if self.confirm_password.is_empty() {
            c.errors.add("confirm_password", "נא להזין אימות סיסמה");
        } else if self.confirm_password != self.password {
            c.errors.add("confirm_password", PASSWORD_MISMATCH);
        }

        c.finish(Registration {
            first_name,
            last_name,
            phone,
            email,
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

impl LoginForm {
    /// Normalised email and the password
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let mut c = Checker::new();
        let email = c.email("email", &self.email);
        if self.password.is_empty() {
            c.errors.add("password", "נא להזין סיסמה");
        }
        c.finish((email, self.password.clone()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactMessage {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<ContactMessage, ValidationError> {
        let mut c = Checker::new();

        let full_name = c.required("full_name", &self.full_name, "נא להזין שם מלא");
        c.length("full_name", &full_name, 2, 80, "שם מלא חייב להיות בין 2 ל-80 תווים");
        c.name("full_name", &full_name, "שם מלא יכול להכיל רק אותיות ורווחים");

        let email = c.email("email", &self.email);
        let phone = c.phone("phone", &self.phone);

        let subject = c.required("subject", &self.subject, "נא להזין נושא");
        c.length("subject", &subject, 2, 120, "נושא חייב להיות בין 2 ל-120 תווים");

        let message = c.required("message", &self.message, "נא להזין הודעה");
        c.length("message", &message, 10, 2000, "הודעה חייבת להיות בין 10 ל-2000 תווים");

        c.finish(ContactMessage {
            full_name,
            email,
            phone,
            subject,
            message,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionForm {
    pub scholarship_name: String,
    pub interest_area: String,
    /// Checkbox: present when ticked
    pub has_submitted: Option<String>,
    pub notes: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionInput {
    pub scholarship_name: String,
    pub interest_area: String,
    pub has_submitted: bool,
    pub notes: Option<String>,
}

impl SubmissionForm {
    pub fn validate(&self) -> Result<SubmissionInput, ValidationError> {
        let mut c = Checker::new();

        let scholarship_name =
            c.required("scholarship_name", &self.scholarship_name, "נא להזין את שם המלגה");
        c.length(
            "scholarship_name",
            &scholarship_name,
            2,
            120,
            "שם המלגה חייב להיות בין 2 ל-120 תווים",
        );

        let interest_area = c.required("interest_area", &self.interest_area, "נא להזין תחום עניין");
        c.length(
            "interest_area",
            &interest_area,
            2,
            120,
            "תחום עניין חייב להיות בין 2 ל-120 תווים",
        );

        let notes = self.notes.trim();
        c.max_length("notes", notes, 1000, "הערות יכולות להכיל עד 1000 תווים");

        c.finish(SubmissionInput {
            scholarship_name,
            interest_area,
            has_submitted: self.has_submitted.is_some(),
            notes: (!notes.is_empty()).then(|| notes.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionnaireForm {
    pub study_status: String,
    pub study_field: String,
    pub institution: String,
    pub military_status: String,
    pub populations: Vec<String>,
    pub work_status: String,
    pub volunteer_willingness: String,
    pub scholarship_duration_preference: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

impl QuestionnaireForm {
    /// Pre-fill from saved answers
    pub fn from_answers(answers: &QuestionnaireAnswers) -> Self {
        Self {
            study_status: answers.study_status.clone(),
            study_field: answers.study_field.clone(),
            institution: answers.institution.clone(),
            military_status: answers.military_status.clone(),
            populations: answers.populations.clone(),
            work_status: answers.work_status.clone(),
            volunteer_willingness: answers.volunteer_willingness.clone(),
            scholarship_duration_preference: answers.scholarship_duration_preference.clone(),
            csrf_token: String::new(),
        }
    }

    pub fn validate(&self) -> Result<QuestionnaireAnswers, ValidationError> {
        let mut c = Checker::new();

        let study_status = c.choice(
            "study_status",
            &self.study_status,
            STUDY_STATUS_CHOICES,
            "נא לבחור סטטוס לימודים",
        );
        let study_field = c.choice(
            "study_field",
            &self.study_field,
            STUDY_FIELD_CHOICES,
            "נא לבחור תחום לימודים",
        );

        let institution = c.required("institution", &self.institution, "נא להזין מוסד לימודים");
        c.length("institution", &institution, 2, 120, "מוסד לימודים חייב להיות בין 2 ל-120 תווים");

        let military_status = c.choice(
            "military_status",
            &self.military_status,
            MILITARY_STATUS_CHOICES,
            "נא לבחור סטטוס שירות",
        );

        let populations: Vec<String> = self
            .populations
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if populations.is_empty() {
            c.errors.add("populations", "נא לבחור לפחות אפשרות אחת");
        } else if populations.iter().any(|p| !POPULATION_CHOICES.contains(&p.as_str())) {
            c.errors.add("populations", INVALID_CHOICE);
        }

        let work_status = c.choice(
            "work_status",
            &self.work_status,
            WORK_STATUS_CHOICES,
            "נא לבחור סטטוס תעסוקתי",
        );
        let volunteer_willingness = c.choice(
            "volunteer_willingness",
            &self.volunteer_willingness,
            VOLUNTEER_CHOICES,
            "נא לבחור נכונות להתנדבות",
        );
        let scholarship_duration_preference = c.choice(
            "scholarship_duration_preference",
            &self.scholarship_duration_preference,
            DURATION_CHOICES,
            "נא לבחור העדפה",
        );

        c.finish(QuestionnaireAnswers {
            study_status,
            study_field,
            institution,
            military_status,
            populations,
            work_status,
            volunteer_willingness,
            scholarship_duration_preference,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScholarshipUpdateForm {
    pub scholarship_id: String,
    pub status: String,
    pub alerts_enabled: Option<String>,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScholarshipUpdate {
    pub id: i64,
    pub status: ScholarshipStatus,
    pub alerts_enabled: bool,
}

impl ScholarshipUpdateForm {
    pub fn validate(&self) -> Result<ScholarshipUpdate, ValidationError> {
        let mut c = Checker::new();
        let id = self.scholarship_id.trim().parse::<i64>();
        if id.is_err() {
            c.errors.add("scholarship_id", INVALID_CHOICE);
        }
        let status = ScholarshipStatus::from_str(&self.status);
        if status.is_err() {
            c.errors.add("status", INVALID_CHOICE);
        }
        match (id, status) {
            (Ok(id), Ok(status)) => c.finish(ScholarshipUpdate {
                id,
                status,
                alerts_enabled: self.alerts_enabled.is_some(),
            }),
            _ => Err(c.errors),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangePasswordForm {
    #[serde(skip_serializing)]
    pub current_password: String,
    #[serde(skip_serializing)]
    pub new_password: String,
    #[serde(skip_serializing)]
    pub confirm_new_password: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

impl ChangePasswordForm {
    /// Rules only; the current password is checked against the stored hash by the caller
    pub fn validate(&self) -> Result<String, ValidationError> {
        let mut c = Checker::new();
        if self.current_password.is_empty() {
            c.errors.add("current_password", "נא להזין סיסמה נוכחית");
        }
        c.password("new_password", &self.new_password, "נא להזין סיסמה חדשה");
        if self.confirm_new_password.is_empty() {
            c.errors.add("confirm_new_password", "נא להזין אימות סיסמה");
        } else if self.confirm_new_password != self.new_password {
            c.errors.add("confirm_new_password", PASSWORD_MISMATCH);
        }
        c.finish(self.new_password.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminMessageForm {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

impl AdminMessageForm {
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let mut c = Checker::new();
        let title = c.required("title", &self.title, "נא להזין כותרת");
        c.length("title", &title, 2, 120, "כותרת חייבת להיות בין 2 ל-120 תווים");
        let body = c.required("body", &self.body, "נא להזין הודעה");
        c.length("body", &body, 5, 2000, "הודעה חייבת להיות בין 5 ל-2000 תווים");
        c.finish((title, body))
    }
}

/// Forms with no fields besides the CSRF token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfOnlyForm {
    #[serde(skip_serializing)]
    pub csrf_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_form() -> RegisterForm {
        RegisterForm {
            first_name: "דנה".to_string(),
            last_name: "Levi".to_string(),
            phone: "0501234567".to_string(),
            email: "  Dana@Example.COM ".to_string(),
            password: "Str0ng!Passw0rd".to_string(),
            confirm_password: "Str0ng!Passw0rd".to_string(),
            csrf_token: String::new(),
        }
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("0501234567").as_deref(), Some("+972501234567"));
        assert_eq!(normalize_phone("+972501234567").as_deref(), Some("+972501234567"));
        assert_eq!(normalize_phone("031234567"), None);
        assert_eq!(normalize_phone("+972301234567"), None);
    }

    #[test]
    fn test_valid_registration_is_normalised() {
        let reg = register_form().validate().unwrap();
        assert_eq!(reg.email, "dana@example.com");
        assert_eq!(reg.phone, "+972501234567");
    }

    #[test]
    fn test_registration_errors_by_field() {
        let mut form = register_form();
        form.first_name = "D4na".to_string();
        form.last_name = "".to_string();
        form.confirm_password = "other".to_string();
        let err = form.validate().unwrap_err();
        assert_eq!(err.get("first_name"), Some("שם פרטי יכול להכיל רק אותיות ורווחים"));
        assert_eq!(err.get("last_name"), Some("נא להזין שם משפחה"));
        assert_eq!(err.get("confirm_password"), Some(PASSWORD_MISMATCH));
        assert_eq!(err.get("email"), None);
    }

    #[test]
    fn test_password_problems_joined() {
        let mut form = register_form();
        form.password = "short".to_string();
        form.confirm_password = "short".to_string();
        let err = form.validate().unwrap_err();
        assert_eq!(
            err.get("password"),
            Some("הסיסמה חייבת להכיל לפחות 10 תווים; הסיסמה חייבת להכיל אות גדולה; הסיסמה חייבת להכיל ספרה; הסיסמה חייבת להכיל תו מיוחד")
        );
    }

    #[test]
    fn test_password_denylist() {
        assert!(password_problems("Str0ng!Passw0rd").is_empty());
        assert!(password_problems("PASSWORD").contains(&"הסיסמה שנבחרה נפוצה מדי"));
    }

    #[test]
    fn test_questionnaire_choices() {
        let form = QuestionnaireForm {
            study_status: "תואר ראשון".to_string(),
            study_field: "אחר".to_string(),
            institution: "אוניברסיטת חיפה".to_string(),
            military_status: "לא רלוונטי".to_string(),
            populations: vec!["עולה חדש".to_string()],
            work_status: "לא עובד".to_string(),
            volunteer_willingness: "לא".to_string(),
            scholarship_duration_preference: "לא משנה".to_string(),
            csrf_token: String::new(),
        };
        assert!(form.validate().is_ok());

        let mut bad = form.clone();
        bad.populations.clear();
        bad.study_status = "דוקטורט".to_string();
        let err = bad.validate().unwrap_err();
        assert_eq!(err.get("populations"), Some("נא לבחור לפחות אפשרות אחת"));
        assert_eq!(err.get("study_status"), Some(INVALID_CHOICE));
    }

    #[test]
    fn test_contact_and_submission_lengths() {
        let contact = ContactForm {
            full_name: "דנה לוי".to_string(),
            email: "dana@example.com".to_string(),
            phone: "0501234567".to_string(),
            subject: "ש".to_string(),
            message: "קצר".to_string(),
            csrf_token: String::new(),
        };
        let err = contact.validate().unwrap_err();
        assert!(err.get("subject").is_some());
        assert!(err.get("message").is_some());

        let submission = SubmissionForm {
            scholarship_name: "מלגת מצוינות".to_string(),
            interest_area: "הנדסה".to_string(),
            has_submitted: Some("y".to_string()),
            notes: "   ".to_string(),
            csrf_token: String::new(),
        };
        let input = submission.validate().unwrap();
        assert!(input.has_submitted);
        assert_eq!(input.notes, None);
    }

    #[test]
    fn test_scholarship_update_accepts_code_or_label() {
        let form = ScholarshipUpdateForm {
            scholarship_id: "12".to_string(),
            status: "הגשתי".to_string(),
            alerts_enabled: None,
            csrf_token: String::new(),
        };
        let update = form.validate().unwrap();
        assert_eq!(update.status, ScholarshipStatus::Applied);
        assert!(!update.alerts_enabled);

        let bad = ScholarshipUpdateForm {
            scholarship_id: "x".to_string(),
            ..form
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_admin_message_lengths() {
        let form = AdminMessageForm {
            title: "שלום".to_string(),
            body: "קצר".to_string(),
            csrf_token: String::new(),
        };
        assert_eq!(
            form.validate().unwrap_err().get("body"),
            Some("הודעה חייבת להיות בין 5 ל-2000 תווים")
        );
    }
}
