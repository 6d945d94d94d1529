// Session, flash and CSRF cookies plus the request extractors built on them

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use common::csrf;
use common::models::User;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::templates;

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";
pub const CSRF_COOKIE: &str = "csrf_id";

lazy_static! {
    static ref SCHEME_REGEX: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap();
}

/// Who is making the request, resolved once per request by the session middleware
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub user: Option<User>,
    pub is_admin: bool,
    pub unread_notifications: i64,
    /// Subject the CSRF token is bound to
    pub csrf_subject: String,
}

impl Viewer {
    pub fn csrf_token(&self, secret: &str) -> String {
        if self.csrf_subject.is_empty() {
            return String::new();
        }
        csrf::issue_token(secret, &self.csrf_subject)
    }

    pub fn verify_csrf(&self, secret: &str, token: &str) -> bool {
        !self.csrf_subject.is_empty() && csrf::verify_token(secret, &self.csrf_subject, token)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Viewer>().cloned().unwrap_or_default())
    }
}

/// A signed-in user; anonymous requests are sent to the login page
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub viewer: Viewer,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let viewer = parts.extensions.get::<Viewer>().cloned().unwrap_or_default();
        match viewer.user.clone() {
            Some(user) => Ok(CurrentUser { user, viewer }),
            None => Err(login_redirect(parts).into_response()),
        }
    }
}

/// The configured admin; other users get the 403 page
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user: User,
    pub viewer: Viewer,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser { user, viewer } = CurrentUser::from_request_parts(parts, state).await?;
        if !viewer.is_admin {
            tracing::warn!(user_id = user.id, path = %parts.uri.path(), "Admin route refused");
            return Err(templates::forbidden(state, &viewer));
        }
        Ok(AdminUser { user, viewer })
    }
}

fn login_redirect(parts: &Parts) -> Redirect {
    let next = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&format!("/login?next={}", urlencoding::encode(next)))
}

/// Only same-site relative targets: no scheme, no host
pub fn is_safe_next(next: Option<&str>) -> bool {
    let Some(next) = next.map(str::trim).filter(|n| !n.is_empty()) else {
        return false;
    };
    !(next.starts_with("//") || next.starts_with("\\") || SCHEME_REGEX.is_match(next))
}

/// First `X-Forwarded-For` entry, then the peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

// ============================================================================
// Cookies
// ============================================================================

pub fn session_cookie(token: String, hours: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::hours(hours as i64))
        .build()
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

pub fn csrf_cookie(subject: String, secure: bool) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, subject))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

fn read_flashes(jar: &CookieJar) -> Vec<Flash> {
    jar.get(FLASH_COOKIE)
        .and_then(|c| hex::decode(c.value()).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

/// Queue a flash message; the value is hex-encoded JSON so any text survives the cookie
pub fn flash(jar: CookieJar, category: &str, message: impl Into<String>) -> CookieJar {
    let mut flashes = read_flashes(&jar);
    flashes.push(Flash {
        category: category.to_string(),
        message: message.into(),
    });
    let value = serde_json::to_vec(&flashes).map(hex::encode).unwrap_or_default();
    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Pending flashes, removing the cookie
pub fn take_flashes(jar: CookieJar) -> (CookieJar, Vec<Flash>) {
    let flashes = read_flashes(&jar);
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, flashes);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), flashes)
}

/// Flash plus redirect, the usual end of a successful POST
pub fn flash_redirect(
    jar: CookieJar,
    category: &str,
    message: impl Into<String>,
    to: &str,
) -> Response {
    (flash(jar, category, message), Redirect::to(to)).into_response()
}

/// Rejection for a form whose CSRF token does not verify
pub fn csrf_failure() -> Response {
    crate::error::AppError::BadRequest("invalid CSRF token".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert!(is_safe_next(Some("/dashboard")));
        assert!(is_safe_next(Some("/my-scholarships?refreshed=1")));
        assert!(!is_safe_next(Some("https://evil.example/")));
        assert!(!is_safe_next(Some("//evil.example/path")));
        assert!(!is_safe_next(Some("javascript:alert(1)")));
        assert!(!is_safe_next(Some("")));
        assert!(!is_safe_next(None));
    }

    fn redirect_target(uri: &str) -> String {
        let (parts, _) = axum::http::Request::builder()
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        let response = login_redirect(&parts).into_response();
        response.headers()["location"].to_str().unwrap().to_string()
    }

    #[test]
    fn test_login_redirect_encodes_next() {
        assert_eq!(redirect_target("/updates?open=3"), "/login?next=%2Fupdates%3Fopen%3D3");
        assert_eq!(redirect_target("/profile"), "/login?next=%2Fprofile");
        assert_eq!(
            redirect_target("/scholarships?q=a%20b&x=1"),
            "/login?next=%2Fscholarships%3Fq%3Da%2520b%26x%3D1"
        );
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, None), "203.0.113.5");

        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(client_ip(&HeaderMap::new(), Some(&peer)), "127.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_flash_round_trip_through_jar() {
        let jar = flash(CookieJar::new(), "success", "ההרשמה הצליחה");
        let jar = flash(jar, "info", "second");
        let (jar, flashes) = take_flashes(jar);
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].message, "ההרשמה הצליחה");
        assert!(read_flashes(&jar).is_empty());
    }

    #[test]
    fn test_csrf_requires_subject() {
        let anonymous = Viewer::default();
        assert_eq!(anonymous.csrf_token("secret"), "");
        assert!(!anonymous.verify_csrf("secret", ""));

        let viewer = Viewer {
            csrf_subject: "user:1".to_string(),
            ..Default::default()
        };
        let token = viewer.csrf_token("secret");
        assert!(viewer.verify_csrf("secret", &token));
    }
}
