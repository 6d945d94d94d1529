use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{cookie::CookieJar, Form};
use common::validation::CsrfOnlyForm;
use serde::Deserialize;
use tera::Context;

use super::csrf_ok;
use crate::error::AppError;
use crate::session::{flash_redirect, CurrentUser};
use crate::state::AppState;
use crate::templates;

#[derive(Debug, Default, Deserialize)]
pub struct UpdatesQuery {
    pub open: Option<String>,
}

/// Every notification, newest first; `?open=<id>` marks that one read
pub async fn updates(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Query(query): Query<UpdatesQuery>,
) -> Result<Response, AppError> {
    let CurrentUser { user, mut viewer } = current;
    let open_id = query.open.as_deref().and_then(|v| v.trim().parse::<i64>().ok());

    if let Some(id) = open_id {
        if state.notifications.mark_read(id, user.id).await? {
            viewer.unread_notifications = (viewer.unread_notifications - 1).max(0);
        }
    }

    let notifications = state.notifications.for_user(user.id, None).await?;

    let mut context = Context::new();
    context.insert("notifications", &notifications);
    context.insert("open_id", &open_id);
    templates::render(&state, &viewer, jar, "updates.html", context)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<CsrfOnlyForm>,
) -> Result<Response, AppError> {
    if !csrf_ok(&state, &current.viewer, &form.csrf_token) {
        return Ok(Redirect::to("/updates").into_response());
    }
    state.notifications.mark_all_read(current.user.id).await?;
    Ok(flash_redirect(jar, "success", "כל ההודעות סומנו כנקראות.", "/updates"))
}
