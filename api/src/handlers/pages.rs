use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tera::Context;

use crate::error::AppError;
use crate::session::{CurrentUser, Viewer};
use crate::state::AppState;
use crate::templates;

pub async fn index(
    State(state): State<AppState>,
    viewer: Viewer,
    jar: CookieJar,
) -> Result<Response, AppError> {
    templates::render(&state, &viewer, jar, "index.html", Context::new())
}

/// Not built yet: signed-in users see 403
pub async fn about(
    State(state): State<AppState>,
    CurrentUser { viewer, .. }: CurrentUser,
) -> Response {
    templates::forbidden(&state, &viewer)
}

pub async fn not_found(State(state): State<AppState>, viewer: Viewer) -> impl IntoResponse {
    templates::not_found(&state, &viewer)
}
