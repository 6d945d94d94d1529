use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{cookie::CookieJar, Form};
use common::catalog::{build_catalog, is_eligible, match_level};
use common::matching::MatchError;
use common::models::ScholarshipStatus;
use common::notion::Requirements;
use common::validation::{CsrfOnlyForm, ScholarshipUpdateForm};
use serde::{Deserialize, Serialize};
use tera::Context;

use super::csrf_ok;
use crate::error::AppError;
use crate::session::{flash, flash_redirect, CurrentUser};
use crate::state::AppState;
use crate::templates;

/// The Notion catalogue, narrowed to what the user is eligible for
#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
pub async fn catalog(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let answers = state
        .questionnaires
        .find_by_user(current.user.id)
        .await?
        .map(|q| q.answers);

    let (scholarships, error) = match state.source.fetch_scholarships().await {
        Ok(list) => (build_catalog(list, answers.as_ref(), &state.images), None),
        Err(e) => {
            tracing::warn!(error = %e, "Catalogue unavailable");
            (Vec::new(), Some(e.user_message()))
        }
    };

    let mut context = Context::new();
    context.insert("scholarships", &scholarships);
    context.insert("error", &error);
    templates::render(&state, &current.viewer, jar, "scholarships.html", context)
}

#[derive(Debug, Default, Deserialize)]
pub struct MyScholarshipsQuery {
    pub refreshed: Option<String>,
}

/// One row of the tracking list
#[derive(Debug, Serialize)]
struct TrackedItem {
    id: i64,
    title: String,
    link: Option<String>,
    score: i64,
    level: &'static str,
    reasons: Vec<String>,
    status: ScholarshipStatus,
    status_label: &'static str,
    alerts_enabled: bool,
}

#[derive(Debug, Serialize)]
struct StatusOption {
    value: &'static str,
    label: &'static str,
}

pub async fn my_scholarships(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Query(query): Query<MyScholarshipsQuery>,
) -> Result<Response, AppError> {
    let user_id = current.user.id;
    let records = state.scholarships.find_by_user(user_id).await?;
    let answers = state.questionnaires.find_by_user(user_id).await?.map(|q| q.answers);

    // Requirements are only looked up when there are answers to check them against
    let mut requirements: HashMap<String, Requirements> = HashMap::new();
    if answers.is_some() {
        match state.source.fetch_pages_raw().await {
            Ok(pages) => {
                requirements = pages.into_iter().map(|p| (p.id, p.requirements)).collect();
            }
            Err(e) => tracing::warn!(error = %e, "Requirements unavailable, showing all matches"),
        }
    }

    let items: Vec<TrackedItem> = records
        .into_iter()
        .filter(|r| r.match_score != 0)
        .filter(|r| is_eligible(requirements.get(&r.scholarship_key), answers.as_ref()))
        .map(|r| TrackedItem {
            id: r.id,
            level: match_level(r.match_score),
            title: r.scholarship_title,
            link: r.scholarship_link,
            score: r.match_score,
            reasons: r.match_reasons,
            status: r.status,
            status_label: r.status_label,
            alerts_enabled: r.alerts_enabled,
        })
        .collect();

    let statuses: Vec<StatusOption> = ScholarshipStatus::ALL
        .iter()
        .map(|s| StatusOption {
            value: s.as_str(),
            label: s.label(),
        })
        .collect();

    let mut context = Context::new();
    context.insert("scholarships", &items);
    context.insert("statuses", &statuses);
    context.insert("refreshed", &(query.refreshed.as_deref() == Some("1")));
    templates::render(&state, &current.viewer, jar, "my_scholarships.html", context)
}

/// Change status and alerts for one row; a status change records its funnel events
#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
pub async fn update_scholarship(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<ScholarshipUpdateForm>,
) -> Result<Response, AppError> {
    const FAILED: &str = "לא ניתן לעדכן את המלגה. נסה שוב.";

    if !csrf_ok(&state, &current.viewer, &form.csrf_token) {
        return Ok(flash_redirect(jar, "danger", FAILED, "/my-scholarships"));
    }
    let update = match form.validate() {
        Ok(update) => update,
        Err(errors) => {
            tracing::debug!(error = %errors, "Rejected scholarship update");
            return Ok(flash_redirect(jar, "danger", FAILED, "/my-scholarships"));
        }
    };

    let user_id = current.user.id;
    let Some(previous) = state
        .scholarships
        .update_tracking(update.id, user_id, update.status, update.alerts_enabled)
        .await?
    else {
        return Ok(Redirect::to("/my-scholarships").into_response());
    };

    if previous.status != update.status {
        let created = state
            .events
            .record_all(user_id, &previous.scholarship_key, update.status.implied_events())
            .await?;
        tracing::debug!(created = created, "Funnel events recorded");
    }

    Ok(flash_redirect(jar, "success", "העדכון נשמר.", "/my-scholarships"))
}

#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
pub async fn refresh_matches(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<CsrfOnlyForm>,
) -> Result<Response, AppError> {
    if !csrf_ok(&state, &current.viewer, &form.csrf_token) {
        return Ok(Redirect::to("/my-scholarships").into_response());
    }

    let jar = match state.matches.refresh(current.user.id).await {
        Ok(_) => flash(jar, "success", "ההתאמות עודכנו."),
        Err(MatchError::NoQuestionnaire) => {
            return Ok(flash_redirect(
                jar,
                "info",
                "יש למלא שאלון לפני רענון התאמות.",
                "/questionnaire",
            ));
        }
        Err(MatchError::Notion(e)) => flash(jar, "info", e.user_message()),
        Err(MatchError::Database(e)) => return Err(e.into()),
    };

    Ok((jar, Redirect::to("/my-scholarships?refreshed=1")).into_response())
}
