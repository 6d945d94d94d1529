use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{cookie::CookieJar, Form};
use common::errors::{AuthError, ValidationError};
use common::validation::{LoginForm, RegisterForm, EMAIL_TAKEN};
use serde::Deserialize;
use tera::Context;

use super::{csrf_ok, form_context, send_registration_email};
use crate::error::AppError;
use crate::session::{
    clear_session, client_ip, csrf_failure, flash, flash_redirect, is_safe_next, session_cookie,
    CurrentUser, Viewer,
};
use crate::state::AppState;
use crate::templates;

pub const REGISTRATION_SUBJECT: &str = "נרשמת בהצלחה למערכת המלגות";

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

fn login_context(
    form: &LoginForm,
    errors: Option<&ValidationError>,
    next: Option<&str>,
) -> Context {
    let mut context = form_context(form, errors);
    if is_safe_next(next) {
        if let Some(next) = next {
            context.insert("next", &urlencoding::encode(next.trim()));
        }
    }
    context
}

fn render_register(
    state: &AppState,
    viewer: &Viewer,
    jar: CookieJar,
    form: &RegisterForm,
    errors: Option<&ValidationError>,
) -> Result<Response, AppError> {
    templates::render(state, viewer, jar, "register.html", form_context(form, errors))
}

pub async fn register_page(
    State(state): State<AppState>,
    viewer: Viewer,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if viewer.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    render_register(&state, &viewer, jar, &RegisterForm::default(), None)
}

#[tracing::instrument(skip_all)]
pub async fn register_submit(
    State(state): State<AppState>,
    viewer: Viewer,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if viewer.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    if !csrf_ok(&state, &viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }

    let registration = match form.validate() {
        Ok(registration) => registration,
        Err(errors) => return render_register(&state, &viewer, jar, &form, Some(&errors)),
    };

    if state.users.email_exists(&registration.email).await? {
        let errors = ValidationError::single("email", EMAIL_TAKEN);
        return render_register(&state, &viewer, jar, &form, Some(&errors));
    }

    let user = match state
        .auth
        .register(
            &registration.first_name,
            &registration.last_name,
            &registration.phone,
            &registration.email,
            &registration.password,
        )
        .await
    {
        Ok(user) => user,
        Err(AuthError::EmailTaken(_)) => {
            let errors = ValidationError::single("email", EMAIL_TAKEN);
            return render_register(&state, &viewer, jar, &form, Some(&errors));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id = user.id, "User registered");

    let mut email_context = Context::new();
    email_context.insert("user", &user);
    email_context.insert("is_test", &false);
    let html = templates::render_fragment(&state, "emails/user_registered.html", &email_context)?;
    send_registration_email(&state, &user.email, html, REGISTRATION_SUBJECT, false).await;

    Ok(flash_redirect(jar, "success", "ההרשמה הצליחה. אפשר להתחבר כעת.", "/login"))
}

pub async fn login_page(
    State(state): State<AppState>,
    viewer: Viewer,
    jar: CookieJar,
    Query(query): Query<NextQuery>,
) -> Result<Response, AppError> {
    if viewer.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let context = login_context(&LoginForm::default(), None, query.next.as_deref());
    templates::render(&state, &viewer, jar, "login.html", context)
}

#[tracing::instrument(skip_all)]
pub async fn login_submit(
    State(state): State<AppState>,
    viewer: Viewer,
    jar: CookieJar,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if viewer.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    if !csrf_ok(&state, &viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    let next = query.next.as_deref();

    let (email, password) = match form.validate() {
        Ok(credentials) => credentials,
        Err(errors) => {
            let context = login_context(&form, Some(&errors), next);
            return templates::render(&state, &viewer, jar, "login.html", context);
        }
    };

    let ip = client_ip(&headers, peer.as_ref());
    let message = match state.auth.login(&email, &password, &ip).await {
        Ok((user, token)) => {
            let jar = jar.add(session_cookie(
                token,
                state.config.auth.session_hours,
                state.config.auth.secure_cookies,
            ));
            let target = match next {
                Some(next) if is_safe_next(Some(next)) => next.trim().to_string(),
                _ => "/dashboard".to_string(),
            };
            tracing::debug!(user_id = user.id, target = %target, "Session issued");
            return Ok((jar, Redirect::to(&target)).into_response());
        }
        Err(AuthError::Locked { remaining_minutes }) => format!(
            "החשבון ננעל זמנית בעקבות ניסיונות כושלים. נסה שוב בעוד {} דקות.",
            remaining_minutes
        ),
        Err(AuthError::InvalidCredentials) => "אימייל או סיסמה שגויים".to_string(),
        Err(e) => return Err(e.into()),
    };

    let jar = flash(jar, "danger", message);
    templates::render(&state, &viewer, jar, "login.html", login_context(&form, None, next))
}

pub async fn logout(CurrentUser { user, .. }: CurrentUser, jar: CookieJar) -> Response {
    tracing::info!(user_id = user.id, "User logged out");
    flash_redirect(clear_session(jar), "info", "התנתקת בהצלחה", "/")
}
