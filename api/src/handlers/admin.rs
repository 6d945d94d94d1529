// Admin console: overview, integration checks, analytics, user detail, export

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::{cookie::CookieJar, Form};
use chrono::{DateTime, Utc};
use common::analytics::ScholarshipAnalytics;
use common::errors::ValidationError;
use common::export;
use common::models::{NewNotification, User};
use common::validation::{AdminMessageForm, CsrfOnlyForm};
use serde::{Deserialize, Serialize};
use tera::Context;

use super::{csrf_ok, form_context, send_registration_email};
use crate::error::AppError;
use crate::session::{csrf_failure, flash_redirect, AdminUser, Viewer};
use crate::state::AppState;
use crate::templates;

pub const TEST_MAKE_SUBJECT: &str = "[TEST] בדיקת הרשמה - Make";
const UNMARKED: &str = "לא סומן";

/// Users, inquiries, submissions and the live catalogue
pub async fn admin_index(
    State(state): State<AppState>,
    admin: AdminUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let users = state.users.find_all().await?;
    let inquiries = state.inquiries.find_all().await?;
    let submissions = state.submissions.find_all().await?;
    let (catalog, catalog_error) = match state.source.fetch_scholarships().await {
        Ok(list) => (list, None),
        Err(e) => (Vec::new(), Some(e.user_message())),
    };

    let mut context = Context::new();
    context.insert("users", &users);
    context.insert("inquiries", &inquiries);
    context.insert("submissions", &submissions);
    context.insert("scholarships_catalog", &catalog);
    context.insert("scholarships_error", &catalog_error);
    context.insert("make_configured", &state.config.make.is_configured());
    templates::render(&state, &admin.viewer, jar, "admin.html", context)
}

/// Send a test `user_registered` payload to the Make test recipient
#[tracing::instrument(skip_all, fields(admin_id = admin.user.id))]
pub async fn test_make(
    State(state): State<AppState>,
    admin: AdminUser,
    jar: CookieJar,
    Form(form): Form<CsrfOnlyForm>,
) -> Result<Response, AppError> {
    if !csrf_ok(&state, &admin.viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    tracing::info!(make_configured = state.config.make.is_configured(), "Make test requested");

    let mut email_context = Context::new();
    email_context.insert("user", &admin.user);
    email_context.insert("is_test", &true);
    let html = templates::render_fragment(&state, "emails/user_registered.html", &email_context)?;
    send_registration_email(&state, &admin.user.email, html, TEST_MAKE_SUBJECT, true).await;

    Ok(flash_redirect(jar, "success", "נשלחה בדיקת webhook ל-Make.", "/admin"))
}

/// Forced test run of the daily digest
#[tracing::instrument(skip_all, fields(admin_id = admin.user.id))]
pub async fn run_digest(
    State(state): State<AppState>,
    admin: AdminUser,
    jar: CookieJar,
    Form(form): Form<CsrfOnlyForm>,
) -> Result<Response, AppError> {
    const NOT_SENT: &str = "לא נשלחה הודעה - אין נתונים זמינים.";

    if !csrf_ok(&state, &admin.viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    match state.digest.run(true, true).await {
        Ok(outcome) if outcome.is_skipped() => Ok(flash_redirect(jar, "info", NOT_SENT, "/admin")),
        Ok(_) => Ok(flash_redirect(jar, "success", "נשלח עדכון מלגות יומי.", "/admin")),
        Err(e) => {
            tracing::error!(error = %e, "Test digest failed");
            Ok(flash_redirect(jar, "info", NOT_SENT, "/admin"))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<String>,
}

pub async fn scholarship_analytics(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(scholarship_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ScholarshipAnalytics>, AppError> {
    let analytics = state
        .analytics
        .scholarship(&scholarship_id, query.days.as_deref())
        .await?;
    Ok(Json(analytics))
}

/// A catalogue entry next to the user's tracking state for it
#[derive(Debug, Serialize)]
struct UserCatalogRow {
    id: String,
    title: String,
    url: String,
    status: String,
    alerts_enabled: Option<bool>,
    updated_at: Option<DateTime<Utc>>,
}

async fn render_user_detail(
    state: &AppState,
    viewer: &Viewer,
    jar: CookieJar,
    user: &User,
    form: &AdminMessageForm,
    errors: Option<&ValidationError>,
) -> Result<Response, AppError> {
    let tracked = state.scholarships.find_by_user(user.id).await?;

    let mut scored: Vec<_> = tracked.iter().filter(|s| s.match_score > 0).cloned().collect();
    scored.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let (all_scholarships, pages_error) = match state.source.fetch_pages_raw().await {
        Ok(pages) => {
            let by_key: HashMap<&str, _> = tracked
                .iter()
                .map(|s| (s.scholarship_key.as_str(), s))
                .collect();
            let rows: Vec<UserCatalogRow> = pages
                .into_iter()
                .map(|page| {
                    let tracked = by_key.get(page.id.as_str());
                    UserCatalogRow {
                        status: tracked
                            .map(|s| s.status_label.to_string())
                            .unwrap_or_else(|| UNMARKED.to_string()),
                        alerts_enabled: tracked.map(|s| s.alerts_enabled),
                        updated_at: tracked.map(|s| s.updated_at),
                        id: page.id,
                        title: page.title,
                        url: page.url,
                    }
                })
                .collect();
            (rows, None)
        }
        Err(e) => (Vec::new(), Some(e.user_message())),
    };

    let submissions = state.submissions.find_by_user(user.id).await?;
    let notifications = state.notifications.for_user(user.id, None).await?;

    let mut context = form_context(form, errors);
    context.insert("user", user);
    context.insert("scholarships", &scored);
    context.insert("all_scholarships", &all_scholarships);
    context.insert("pages_error", &pages_error);
    context.insert("submissions", &submissions);
    context.insert("notifications", &notifications);
    templates::render(state, viewer, jar, "admin_user.html", context)
}

pub async fn user_detail(
    State(state): State<AppState>,
    admin: AdminUser,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let Some(user) = state.users.find_by_id(user_id).await? else {
        return Ok(templates::not_found(&state, &admin.viewer));
    };
    render_user_detail(&state, &admin.viewer, jar, &user, &AdminMessageForm::default(), None).await
}

/// Send a notification from the admin to the user
#[tracing::instrument(skip_all, fields(admin_id = admin.user.id, user_id = user_id))]
pub async fn message_user(
    State(state): State<AppState>,
    admin: AdminUser,
    jar: CookieJar,
    Path(user_id): Path<i64>,
    Form(form): Form<AdminMessageForm>,
) -> Result<Response, AppError> {
    let Some(user) = state.users.find_by_id(user_id).await? else {
        return Ok(templates::not_found(&state, &admin.viewer));
    };
    if !csrf_ok(&state, &admin.viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    let (title, body) = match form.validate() {
        Ok(message) => message,
        Err(errors) => {
            return render_user_detail(&state, &admin.viewer, jar, &user, &form, Some(&errors)).await
        }
    };

    state
        .notifications
        .create(&NewNotification::from_admin(user.id, &title, &body))
        .await?;

    Ok(flash_redirect(
        jar,
        "success",
        "ההודעה נשלחה למשתמש.",
        &format!("/admin/users/{}", user.id),
    ))
}

/// All users as an xlsx download
#[tracing::instrument(skip_all, fields(admin_id = admin.user.id))]
pub async fn export_users(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Response, AppError> {
    let (bytes, count) = export::export_all(&state.users).await?;
    tracing::info!(users = count, "Users exported");
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, export::CONTENT_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export::FILE_NAME),
            ),
        ],
        bytes,
    )
        .into_response())
}
