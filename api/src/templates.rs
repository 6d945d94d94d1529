// Tera templates and the shared page context

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use tera::{Context, Tera, Value};

use crate::error::AppError;
use crate::session::{take_flashes, Viewer};
use crate::state::AppState;

pub const DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Load every `*.html` under `dir` and register the filters
pub fn load(dir: &str) -> Result<Tera, tera::Error> {
    let mut tera = Tera::new(&format!("{}/**/*.html", dir.trim_end_matches('/')))?;
    tera.register_filter("datetime", datetime_filter);
    tracing::info!(dir = %dir, templates = tera.get_template_names().count(), "Templates loaded");
    Ok(tera)
}

/// RFC 3339 timestamps as `dd/mm/YYYY HH:MM`; empty for null
fn datetime_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::Null => Ok(Value::String(String::new())),
        Value::String(s) if s.is_empty() => Ok(Value::String(String::new())),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Value::String(dt.with_timezone(&Utc).format(DATETIME_FORMAT).to_string()))
            .map_err(|e| tera::Error::msg(format!("datetime filter: {}", e))),
        other => Err(tera::Error::msg(format!("datetime filter expects a string, got {}", other))),
    }
}

/// Context every page gets: viewer, admin flag, unread count, CSRF token
pub fn base_context(state: &AppState, viewer: &Viewer) -> Context {
    let mut context = Context::new();
    context.insert("current_user", &viewer.user);
    context.insert("is_admin", &viewer.is_admin);
    context.insert("unread_notifications", &viewer.unread_notifications);
    context.insert("csrf_token", &viewer.csrf_token(&state.config.server.secret_key));
    context.insert("errors", &HashMap::<String, String>::new());
    context
}

/// Render a page, consuming pending flash messages
pub fn render(
    state: &AppState,
    viewer: &Viewer,
    jar: CookieJar,
    name: &str,
    context: Context,
) -> Result<Response, AppError> {
    render_with_status(state, viewer, jar, StatusCode::OK, name, context)
}

pub fn render_with_status(
    state: &AppState,
    viewer: &Viewer,
    jar: CookieJar,
    status: StatusCode,
    name: &str,
    context: Context,
) -> Result<Response, AppError> {
    let (jar, flashes) = take_flashes(jar);
    let mut full = base_context(state, viewer);
    full.extend(context);
    full.insert("flashes", &flashes);
    let html = state.templates.render(name, &full)?;
    Ok((status, jar, Html(html)).into_response())
}

/// Render a template outside of a request, e.g. an email body
pub fn render_fragment(
    state: &AppState,
    name: &str,
    context: &Context,
) -> Result<String, AppError> {
    Ok(state.templates.render(name, context)?)
}

fn status_page(state: &AppState, viewer: &Viewer, status: StatusCode, name: &str) -> Response {
    render_with_status(state, viewer, CookieJar::new(), status, name, Context::new())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, template = name, "Failed to render status page");
            status.into_response()
        })
}

pub fn forbidden(state: &AppState, viewer: &Viewer) -> Response {
    status_page(state, viewer, StatusCode::FORBIDDEN, "403.html")
}

pub fn not_found(state: &AppState, viewer: &Viewer) -> Response {
    status_page(state, viewer, StatusCode::NOT_FOUND, "404.html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_filter() {
        let args = HashMap::new();
        let value = Value::String("2024-03-05T14:07:00Z".to_string());
        assert_eq!(
            datetime_filter(&value, &args).unwrap(),
            Value::String("05/03/2024 14:07".to_string())
        );
        assert_eq!(datetime_filter(&Value::Null, &args).unwrap(), Value::String(String::new()));
        assert!(datetime_filter(&Value::Bool(true), &args).is_err());
    }

    #[test]
    fn test_templates_parse() {
        let tera = load(concat!(env!("CARGO_MANIFEST_DIR"), "/templates")).unwrap();
        assert!(tera.get_template_names().any(|n| n == "base.html"));
        assert!(tera.get_template_names().any(|n| n == "emails/user_registered.html"));
    }
}
