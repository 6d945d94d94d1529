// Repository, analytics and export tests over a temporary SQLite database

use calamine::{open_workbook, Data, Reader, Xlsx};
use common::analytics::{AnalyticsService, CountSource};
use common::auth::{AuthService, JwtService};
use common::config::{AuthConfig, DatabaseConfig};
use common::db::repositories::{
    LoginAttemptRepository, NotificationRepository, QuestionnaireRepository,
    ScholarshipEventRepository, SubmissionRepository, UserRepository, UserScholarshipRepository,
};
use common::db::DbPool;
use common::errors::{AuthError, DatabaseError};
use common::export;
use common::models::{
    NewNotification, NewSubmission, NewUser, QuestionnaireAnswers, ScholarshipStatus,
    ScoredMatch, User,
};
use tempfile::TempDir;

async fn sqlite_pool() -> (DbPool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        sqlite_path: Some(dir.path().join("storage.db").display().to_string()),
        ..Default::default()
    };
    let pool = DbPool::connect_and_migrate(&config).await.unwrap();
    (pool, dir)
}

async fn create_user(users: &UserRepository, first_name: &str, email: &str) -> User {
    users
        .create(&NewUser {
            first_name: first_name.to_string(),
            last_name: "Cohen".to_string(),
            phone: "0501234567".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap()
}

fn scored(key: &str, score: i64) -> ScoredMatch {
    ScoredMatch {
        key: key.to_string(),
        title: format!("מלגה {}", key),
        link: Some(format!("https://www.notion.so/{}", key)),
        score,
        reasons: vec!["תחום לימוד: הנדסה".to_string()],
    }
}

fn auth_service(pool: &DbPool) -> AuthService {
    AuthService::new(
        JwtService::new("storage-test-secret", 1),
        UserRepository::new(pool.clone()),
        LoginAttemptRepository::new(pool.clone()),
        &AuthConfig::default(),
    )
    .with_bcrypt_cost(4)
}

const PASSWORD: &str = "Str0ng!Passw0rd";

#[tokio::test]
async fn test_user_email_is_unique() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool);

    let created = create_user(&users, "Dana", "dana@example.com").await;
    assert!(users.email_exists("dana@example.com").await.unwrap());
    assert_eq!(
        users.find_by_email("dana@example.com").await.unwrap().map(|u| u.id),
        Some(created.id)
    );

    let duplicate = users
        .create(&NewUser {
            first_name: "Other".to_string(),
            last_name: "Cohen".to_string(),
            phone: "0501234567".to_string(),
            email: "dana@example.com".to_string(),
            password_hash: "hash".to_string(),
        })
        .await;
    assert!(matches!(duplicate, Err(DatabaseError::DuplicateKey(_))));
}

#[tokio::test]
async fn test_questionnaire_upsert_replaces_answers() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let questionnaires = QuestionnaireRepository::new(pool);
    let user = create_user(&users, "Dana", "dana@example.com").await;

    assert!(questionnaires.find_by_user(user.id).await.unwrap().is_none());

    let mut answers = QuestionnaireAnswers {
        study_status: "תואר ראשון".to_string(),
        study_field: "הנדסה / מדעים מדויקים".to_string(),
        populations: vec!["עולה חדש".to_string()],
        ..Default::default()
    };
    let first = questionnaires.upsert(user.id, &answers).await.unwrap();

    answers.populations = vec!["תושב פריפריה".to_string(), "עולה חדש".to_string()];
    let second = questionnaires.upsert(user.id, &answers).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.submitted_at, second.submitted_at);
    let stored = questionnaires.find_by_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.answers, answers);
}

#[tokio::test]
async fn test_match_upsert_keeps_tracking_state() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let scholarships = UserScholarshipRepository::new(pool);
    let user = create_user(&users, "Dana", "dana@example.com").await;

    scholarships
        .upsert_matches(user.id, &[scored("a", 40), scored("b", 10)])
        .await
        .unwrap();
    let rows = scholarships.find_by_user(user.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == ScholarshipStatus::Interested && !r.alerts_enabled));

    let row_a = rows.iter().find(|r| r.scholarship_key == "a").unwrap();
    let previous = scholarships
        .update_tracking(row_a.id, user.id, ScholarshipStatus::Applied, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(previous.status, ScholarshipStatus::Interested);

    scholarships.upsert_matches(user.id, &[scored("a", 55)]).await.unwrap();
    let refreshed = scholarships.find_by_user(user.id).await.unwrap();
    let row_a = refreshed.iter().find(|r| r.scholarship_key == "a").unwrap();
    assert_eq!(row_a.match_score, 55);
    assert_eq!(row_a.status, ScholarshipStatus::Applied);
    assert_eq!(row_a.status_label, "הגשתי");
    assert!(row_a.alerts_enabled);
}

#[tokio::test]
async fn test_update_tracking_ignores_other_users_rows() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let scholarships = UserScholarshipRepository::new(pool);
    let owner = create_user(&users, "Dana", "dana@example.com").await;
    let other = create_user(&users, "Noa", "noa@example.com").await;

    scholarships.upsert_matches(owner.id, &[scored("a", 40)]).await.unwrap();
    let row = &scholarships.find_by_user(owner.id).await.unwrap()[0];

    let result = scholarships
        .update_tracking(row.id, other.id, ScholarshipStatus::Accepted, true)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(
        scholarships.find_by_user(owner.id).await.unwrap()[0].status,
        ScholarshipStatus::Interested
    );
}

#[tokio::test]
async fn test_dashboard_orders_by_status_then_score() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let scholarships = UserScholarshipRepository::new(pool);
    let user = create_user(&users, "Dana", "dana@example.com").await;

    scholarships
        .upsert_matches(user.id, &[scored("low", 10), scored("high", 90), scored("mid", 50)])
        .await
        .unwrap();
    let rows = scholarships.find_by_user(user.id).await.unwrap();
    let low = rows.iter().find(|r| r.scholarship_key == "low").unwrap();
    let high = rows.iter().find(|r| r.scholarship_key == "high").unwrap();
    scholarships
        .update_tracking(low.id, user.id, ScholarshipStatus::Accepted, false)
        .await
        .unwrap();
    scholarships
        .update_tracking(high.id, user.id, ScholarshipStatus::NotInterested, false)
        .await
        .unwrap();

    let top: Vec<String> = scholarships
        .dashboard_top(user.id, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.scholarship_key)
        .collect();
    assert_eq!(top, vec!["low", "mid", "high"]);
}

#[tokio::test]
async fn test_alerts_feed_skips_not_interested_rows() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let scholarships = UserScholarshipRepository::new(pool);
    let user = create_user(&users, "Dana", "dana@example.com").await;

    scholarships
        .upsert_matches(user.id, &[scored("a", 40), scored("b", 30)])
        .await
        .unwrap();
    let rows = scholarships.find_by_user(user.id).await.unwrap();
    let a = rows.iter().find(|r| r.scholarship_key == "a").unwrap();
    let b = rows.iter().find(|r| r.scholarship_key == "b").unwrap();
    scholarships
        .update_tracking(a.id, user.id, ScholarshipStatus::Applied, true)
        .await
        .unwrap();
    scholarships
        .update_tracking(b.id, user.id, ScholarshipStatus::NotInterested, true)
        .await
        .unwrap();

    let feed = scholarships.alerts_feed().await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].user_email, "dana@example.com");
    assert_eq!(feed[0].scholarship_title, "מלגה a");
}

#[tokio::test]
async fn test_tracking_flags_read_back() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let scholarships = UserScholarshipRepository::new(pool);
    let user = create_user(&users, "Dana", "dana@example.com").await;

    scholarships.upsert_matches(user.id, &[scored("a", 40)]).await.unwrap();
    let row = scholarships.find_by_user(user.id).await.unwrap().remove(0);
    assert!(!row.alerts_enabled);

    scholarships
        .update_tracking(row.id, user.id, ScholarshipStatus::Interested, true)
        .await
        .unwrap();
    let enabled = scholarships.find_for_user(row.id, user.id).await.unwrap().unwrap();
    assert!(enabled.alerts_enabled);

    scholarships
        .update_tracking(row.id, user.id, ScholarshipStatus::Interested, false)
        .await
        .unwrap();
    let disabled = scholarships.find_for_user(row.id, user.id).await.unwrap().unwrap();
    assert!(!disabled.alerts_enabled);
    assert!(scholarships.alerts_feed().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submissions_read_back_with_email() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let submissions = SubmissionRepository::new(pool);
    let user = create_user(&users, "Dana", "dana@example.com").await;

    for (name, has_submitted) in [("מלגת קרן", true), ("מלגת עירייה", false)] {
        submissions
            .create(&NewSubmission {
                user_id: user.id,
                scholarship_name: name.to_string(),
                interest_area: "הנדסה".to_string(),
                has_submitted,
                notes: None,
                ip: "127.0.0.1".to_string(),
            })
            .await
            .unwrap();
    }

    let all = submissions.find_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].scholarship_name, "מלגת עירייה");
    assert!(!all[0].has_submitted);
    assert!(all[1].has_submitted);
    assert_eq!(all[1].user_email.as_deref(), Some("dana@example.com"));
    assert_eq!(submissions.find_by_user(user.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_login_locks_after_repeated_failures() {
    let (pool, _dir) = sqlite_pool().await;
    let auth = auth_service(&pool);
    auth.register("Dana", "Cohen", "0501234567", "dana@example.com", PASSWORD)
        .await
        .unwrap();

    for _ in 0..8 {
        let result = auth.login("dana@example.com", "wrong-password", "10.0.0.1").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let locked = auth.login("dana@example.com", PASSWORD, "10.0.0.1").await;
    assert!(matches!(locked, Err(AuthError::Locked { remaining_minutes: 5 })));

    // The lock is per address
    let (user, token) = auth
        .login("dana@example.com", PASSWORD, "10.0.0.2")
        .await
        .unwrap();
    assert_eq!(user.email, "dana@example.com");
    assert!(!token.is_empty());
}

#[tokio::test]
async fn test_successful_login_resets_failures() {
    let (pool, _dir) = sqlite_pool().await;
    let auth = auth_service(&pool);
    let attempts = LoginAttemptRepository::new(pool.clone());
    auth.register("Dana", "Cohen", "0501234567", "dana@example.com", PASSWORD)
        .await
        .unwrap();

    for _ in 0..7 {
        assert!(auth.login("dana@example.com", "nope", "10.0.0.1").await.is_err());
    }
    assert_eq!(
        attempts.find("dana@example.com", "10.0.0.1").await.unwrap().unwrap().attempts,
        7
    );

    auth.login("dana@example.com", PASSWORD, "10.0.0.1").await.unwrap();
    let cleared = attempts.find("dana@example.com", "10.0.0.1").await.unwrap().unwrap();
    assert_eq!(cleared.attempts, 0);
    assert!(cleared.locked_until.is_none());

    // Seven more failures stay under the threshold after the reset
    for _ in 0..7 {
        let result = auth.login("dana@example.com", "nope", "10.0.0.1").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }
    auth.login("dana@example.com", PASSWORD, "10.0.0.1").await.unwrap();
}

#[tokio::test]
async fn test_notifications_read_state() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let notifications = NotificationRepository::new(pool);
    let user = create_user(&users, "Dana", "dana@example.com").await;
    let other = create_user(&users, "Noa", "noa@example.com").await;

    let first = notifications
        .create(&NewNotification::from_admin(user.id, "ראשונה", "גוף"))
        .await
        .unwrap();
    notifications
        .create(&NewNotification::from_admin(user.id, "שנייה", "גוף"))
        .await
        .unwrap();
    assert_eq!(notifications.unread_count(user.id).await.unwrap(), 2);

    let latest = notifications.for_user(user.id, Some(1)).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].title, "שנייה");

    assert!(!notifications.mark_read(first, other.id).await.unwrap());
    assert!(notifications.mark_read(first, user.id).await.unwrap());
    assert!(!notifications.mark_read(first, user.id).await.unwrap());
    assert_eq!(notifications.unread_count(user.id).await.unwrap(), 1);

    assert_eq!(notifications.mark_all_read(user.id).await.unwrap(), 1);
    assert_eq!(notifications.unread_count(user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_analytics_from_statuses_and_events() {
    let (pool, _dir) = sqlite_pool().await;
    let users = UserRepository::new(pool.clone());
    let scholarships = UserScholarshipRepository::new(pool.clone());
    let events = ScholarshipEventRepository::new(pool);
    let analytics = AnalyticsService::new(events.clone(), scholarships.clone());

    let statuses = [
        ScholarshipStatus::Interested,
        ScholarshipStatus::Applied,
        ScholarshipStatus::Accepted,
    ];
    for (i, status) in statuses.iter().enumerate() {
        let user = create_user(&users, "Dana", &format!("user{}@example.com", i)).await;
        scholarships.upsert_matches(user.id, &[scored("s1", 40)]).await.unwrap();
        let row = &scholarships.find_by_user(user.id).await.unwrap()[0];
        scholarships
            .update_tracking(row.id, user.id, *status, false)
            .await
            .unwrap();
        events
            .record_all(user.id, "s1", status.implied_events())
            .await
            .unwrap();
    }

    let by_status = analytics.scholarship("s1", None).await.unwrap();
    assert_eq!(by_status.source, CountSource::Status);
    assert_eq!(by_status.window, "all");
    assert_eq!(by_status.counts.interested, 3);
    assert_eq!(by_status.counts.applied, 2);
    assert_eq!(by_status.counts.accepted, 1);
    assert_eq!(by_status.rates.applied_rate, 67);
    assert_eq!(by_status.rates.accepted_rate, 50);

    let by_events = analytics.scholarship("s1", Some("30")).await.unwrap();
    assert_eq!(by_events.source, CountSource::Events);
    assert_eq!(by_events.counts, by_status.counts);

    // Events are recorded once per user
    assert_eq!(
        events
            .record_all(1, "s1", ScholarshipStatus::Interested.implied_events())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_export_writes_readable_workbook() {
    let (pool, dir) = sqlite_pool().await;
    let users = UserRepository::new(pool);
    create_user(&users, "Dana", "dana@example.com").await;
    create_user(&users, "נועה", "noa@example.com").await;

    let (path, count) = export::export_to_dir(&users, &dir.path().join("exports"))
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert!(path.ends_with(export::FILE_NAME));

    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    let range = workbook.worksheet_range(export::SHEET_NAME).unwrap();
    let rows: Vec<_> = range.rows().collect();

    assert_eq!(rows.len(), 3);
    let header: Vec<String> = rows[0].iter().map(|c| c.to_string()).collect();
    assert_eq!(header, export::HEADER.to_vec());
    assert_eq!(rows[1][0], Data::Float(1.0));
    assert_eq!(rows[2][1], Data::String("נועה".to_string()));
    assert_eq!(rows[2][4], Data::String("noa@example.com".to_string()));
}
