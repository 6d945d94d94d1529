use axum::{extract::State, response::Response};
use axum_extra::extract::cookie::CookieJar;
use tera::Context;

use crate::error::AppError;
use crate::session::CurrentUser;
use crate::state::AppState;
use crate::templates;

const TOP_SCHOLARSHIPS: i64 = 10;
const LATEST_NOTIFICATIONS: i64 = 3;

/// Top tracked scholarships and the latest notifications
#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
pub async fn dashboard_index(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let scholarships = state
        .scholarships
        .dashboard_top(current.user.id, TOP_SCHOLARSHIPS)
        .await?;
    let notifications = state
        .notifications
        .for_user(current.user.id, Some(LATEST_NOTIFICATIONS))
        .await?;

    let mut context = Context::new();
    context.insert("scholarships", &scholarships);
    context.insert("notifications", &notifications);
    templates::render(&state, &current.viewer, jar, "dashboard.html", context)
}
