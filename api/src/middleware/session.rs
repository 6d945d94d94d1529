use axum::{
    extract::{Request, State},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use common::{auth, csrf};

use crate::session::{clear_session, csrf_cookie, Viewer, CSRF_COOKIE, SESSION_COOKIE};
use crate::state::AppState;

/// Resolve the session cookie into a `Viewer` request extension
///
/// Invalid or expired sessions are dropped and their cookie cleared.
/// Anonymous visitors get a random CSRF subject kept in its own cookie.
pub async fn load_viewer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let mut jar_out = jar.clone();

    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => match state.auth.user_from_token(cookie.value()).await {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::debug!(error = %e, "Discarding session cookie");
                jar_out = clear_session(jar_out);
                None
            }
        },
        None => None,
    };

    let csrf_subject = match &user {
        Some(user) => format!("user:{}", user.id),
        None => {
            let existing = jar
                .get(CSRF_COOKIE)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty());
            let value = match existing {
                Some(value) => value,
                None => {
                    let value = csrf::generate_anonymous_subject();
                    jar_out = jar_out
                        .add(csrf_cookie(value.clone(), state.config.auth.secure_cookies));
                    value
                }
            };
            format!("anon:{}", value)
        }
    };

    let (is_admin, unread_notifications) = match &user {
        Some(user) => {
            let admin_email = state.admin_email();
            let unread = state
                .notifications
                .unread_count(user.id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        user_id = user.id,
                        error = %e,
                        "Failed to count unread notifications"
                    );
                    0
                });
            (auth::is_admin(Some(&user.email), admin_email.as_deref()), unread)
        }
        None => (false, 0),
    };

    req.extensions_mut().insert(Viewer {
        user,
        is_admin,
        unread_notifications,
        csrf_subject,
    });

    let mut response = next.run(req).await;
    merge_cookies(&mut response, jar_out);
    response
}

/// Append the middleware's cookies, leaving any the handler already set alone
fn merge_cookies(response: &mut Response, jar: CookieJar) {
    let set_by_handler: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split('=').next())
        .map(|name| name.trim().to_string())
        .collect();

    let ours = (jar, ()).into_response();
    for value in ours.headers().get_all(SET_COOKIE) {
        let name = value
            .to_str()
            .ok()
            .and_then(|v| v.split('=').next())
            .map(str::trim)
            .unwrap_or_default();
        if !set_by_handler.iter().any(|n| n == name) {
            response.headers_mut().append(SET_COOKIE, value.clone());
        }
    }
}
