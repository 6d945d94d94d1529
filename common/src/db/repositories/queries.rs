// SQL query constants for repositories
// Column lists shared by several SELECTs

/// SQL query fragments for users table
pub mod user_queries {
    pub const SELECT_ALL_COLUMNS: &str =
        "id, first_name, last_name, phone, email, password_hash, profile_image, created_at";
}

/// SQL query fragments for inquiries table
pub mod inquiry_queries {
    pub const SELECT_ALL_COLUMNS: &str =
        "id, user_id, full_name, email, phone, subject, message, ip, created_at";
}

/// SQL query fragments for scholarship_submissions table
pub mod submission_queries {
    /// Columns prefixed with `s.` for joins against users
    pub const SELECT_JOINED_COLUMNS: &str = r#"s.id, s.user_id, s.scholarship_name,
        s.interest_area, s.has_submitted, s.notes, s.ip, s.created_at,
        u.email AS user_email"#;
}

/// SQL query fragments for user_questionnaire table
pub mod questionnaire_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, user_id, study_status, study_field,
        institution, military_status, populations, work_status,
        volunteer_willingness, scholarship_duration_preference,
        submitted_at, updated_at"#;
}

/// SQL query fragments for user_scholarships table
pub mod user_scholarship_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, user_id, scholarship_key, scholarship_title,
        scholarship_link, match_score, match_reasons, status, alerts_enabled,
        created_at, updated_at"#;
}

/// SQL query fragments for notifications table
pub mod notification_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, recipient_user_id, sender_type, sender_label,
        title, body, created_at, read_at"#;
}

/// SQL query fragments for login_attempts table
pub mod login_attempt_queries {
    pub const SELECT_ALL_COLUMNS: &str =
        "id, email, ip, attempts, last_failed_at, locked_until";
}

/// Render statuses as a quoted SQL list, e.g. `'interested', 'applied'`
///
/// Only ever fed with the fixed status codes, never user input.
pub fn status_list(statuses: &[crate::models::ScholarshipStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScholarshipStatus;

    #[test]
    fn test_status_list() {
        assert_eq!(
            status_list(&ScholarshipStatus::INTERESTED),
            "'interested', 'applied', 'accepted'"
        );
        assert_eq!(status_list(&[]), "");
    }
}
