// Router tests: full request flows over a temporary SQLite database with
// mocked Notion and Make integrations

use std::collections::HashMap;
use std::sync::Arc;

use api::{create_router, templates, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use common::config::{DatabaseConfig, Settings};
use common::db::DbPool;
use common::make::{Delivery, MockNotifier};
use common::notion::{MockScholarshipSource, Requirements, Scholarship, ScholarshipField};
use lazy_static::lazy_static;
use regex::Regex;
use tempfile::TempDir;
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "admin@example.com";
const PASSWORD: &str = "Str0ng!Passw0rd";

lazy_static! {
    static ref CSRF_FIELD: Regex = Regex::new(r#"name="csrf_token" value="([^"]+)""#).unwrap();
}

fn sample_scholarship() -> Scholarship {
    Scholarship {
        id: "page-1".to_string(),
        title: "מלגת מצוינות".to_string(),
        url: "https://www.notion.so/page-1".to_string(),
        tags: vec!["הנדסה".to_string()],
        fields: vec![ScholarshipField {
            name: "Deadline".to_string(),
            value: "2099-01-01".to_string(),
        }],
        requirements: Requirements::default(),
    }
}

fn catalog_source() -> MockScholarshipSource {
    let mut source = MockScholarshipSource::new();
    source
        .expect_fetch_scholarships()
        .returning(|| Ok(vec![sample_scholarship()]));
    source.expect_fetch_pages_raw().returning(|| Ok(vec![]));
    source
}

fn accepting_notifier() -> MockNotifier {
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().returning(|_| Ok(Delivery::Sent));
    notifier
}

/// A router plus the cookies a browser would hold between requests
struct TestClient {
    router: Router,
    cookies: HashMap<String, String>,
    _db_dir: TempDir,
}

impl TestClient {
    async fn new(source: MockScholarshipSource, notifier: MockNotifier) -> Self {
        let db_dir = tempfile::tempdir().unwrap();
        let manifest = env!("CARGO_MANIFEST_DIR");

        let mut config = Settings::default();
        config.database = DatabaseConfig {
            sqlite_path: Some(db_dir.path().join("test.db").display().to_string()),
            ..Default::default()
        };
        config.server.secret_key = "router-test-secret".to_string();
        config.server.templates_dir = format!("{}/templates", manifest);
        config.server.static_dir = db_dir.path().join("static").display().to_string();
        config.admin.email = Some(ADMIN_EMAIL.to_string());
        config.admin.alerts_feed_token = Some("feed-token".to_string());
        config.scheduler.enabled = false;

        let pool = DbPool::connect_and_migrate(&config.database).await.unwrap();
        let tera = templates::load(&config.server.templates_dir).unwrap();
        let mut state =
            AppState::new(config, pool, tera, Arc::new(source), Arc::new(notifier)).unwrap();
        state.auth = state.auth.clone().with_bcrypt_cost(4);

        Self {
            router: create_router(state),
            cookies: HashMap::new(),
            _db_dir: db_dir,
        }
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn remember_cookies(&mut self, response: &Response) {
        for value in response.headers().get_all(header::SET_COOKIE) {
            let raw = value.to_str().unwrap();
            let pair = raw.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            if value.is_empty() || raw.contains("Max-Age=0") {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    async fn send(&mut self, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();
        self.remember_cookies(&response);
        response
    }

    async fn get(&mut self, uri: &str) -> Response {
        let request = Request::get(uri)
            .header(header::COOKIE, self.cookie_header())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> Response {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::post(uri)
            .header(header::COOKIE, self.cookie_header())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Load a page and pull the CSRF token out of its first form
    async fn csrf_token(&mut self, uri: &str) -> String {
        let response = self.get(uri).await;
        let html = body_text(response).await;
        CSRF_FIELD
            .captures(&html)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| panic!("no csrf token on {}", uri))
    }

    async fn register(&mut self, first_name: &str, email: &str) -> Response {
        let token = self.csrf_token("/register").await;
        self.post_form(
            "/register",
            &[
                ("first_name", first_name),
                ("last_name", "Levi"),
                ("phone", "0501234567"),
                ("email", email),
                ("password", PASSWORD),
                ("confirm_password", PASSWORD),
                ("csrf_token", &token),
            ],
        )
        .await
    }

    async fn login(&mut self, email: &str, password: &str) -> Response {
        let token = self.csrf_token("/login").await;
        self.post_form(
            "/login",
            &[("email", email), ("password", password), ("csrf_token", &token)],
        )
        .await
    }

    async fn sign_up_and_in(&mut self, first_name: &str, email: &str) {
        let response = self.register(first_name, email).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let response = self.login(email, PASSWORD).await;
        assert_eq!(location(&response), "/dashboard");
    }
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health_reports_integration_flags() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;

    let response = client.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["make_configured"], false);
    assert_eq!(body["notion_configured"], false);
    assert_eq!(body["admin_email_configured"], true);
}

#[tokio::test]
async fn test_anonymous_visitor_is_sent_to_login_with_next() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;

    let response = client.get("/my-scholarships?refreshed=1").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?next=%2Fmy-scholarships%3Frefreshed%3D1");
}

#[tokio::test]
async fn test_unknown_path_renders_404_page() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;

    let response = client.get("/no-such-page").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_sends_email_and_login_opens_dashboard() {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|payload| payload.email == "dana@example.com" && !payload.is_test)
        .times(1)
        .returning(|_| Ok(Delivery::Sent));
    let mut client = TestClient::new(catalog_source(), notifier).await;

    let response = client.register("Dana", "Dana@Example.com").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let login_page = body_text(client.get("/login").await).await;
    assert!(login_page.contains("ההרשמה הצליחה"));

    let response = client.login("dana@example.com", PASSWORD).await;
    assert_eq!(location(&response), "/dashboard");

    let dashboard = client.get("/dashboard").await;
    assert_eq!(dashboard.status(), StatusCode::OK);
    assert!(body_text(dashboard).await.contains("שלום Dana"));
}

#[tokio::test]
async fn test_duplicate_registration_shows_field_error() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.register("Dana", "dana@example.com").await;

    let response = client.register("Dana", "dana@example.com").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("האימייל כבר רשום במערכת"));
}

#[tokio::test]
async fn test_login_with_wrong_password_stays_on_login() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.register("Dana", "dana@example.com").await;

    let response = client.login("dana@example.com", "Wr0ng!Password").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!client.cookies.contains_key("session"));
}

#[tokio::test]
async fn test_post_without_csrf_token_is_rejected() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.get("/register").await;

    let response = client
        .post_form("/login", &[("email", "a@example.com"), ("password", PASSWORD)])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_honours_safe_next_only() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.register("Dana", "dana@example.com").await;

    let token = client.csrf_token("/login").await;
    let response = client
        .post_form(
            "/login?next=https://evil.example.com",
            &[("email", "dana@example.com"), ("password", PASSWORD), ("csrf_token", &token)],
        )
        .await;
    assert_eq!(location(&response), "/dashboard");

    client.get("/logout").await;
    let token = client.csrf_token("/login").await;
    let response = client
        .post_form(
            "/login?next=%2Fupdates",
            &[("email", "dana@example.com"), ("password", PASSWORD), ("csrf_token", &token)],
        )
        .await;
    assert_eq!(location(&response), "/updates");
}

#[tokio::test]
async fn test_catalog_lists_notion_scholarships() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.sign_up_and_in("Dana", "dana@example.com").await;

    let response = client.get("/scholarships").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("מלגת מצוינות"));
    assert!(html.contains("2099-01-01"));
}

#[tokio::test]
async fn test_refresh_without_questionnaire_redirects_to_questionnaire() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.sign_up_and_in("Dana", "dana@example.com").await;

    let token = client.csrf_token("/my-scholarships").await;
    let response = client
        .post_form("/my-scholarships/refresh", &[("csrf_token", &token)])
        .await;
    assert_eq!(location(&response), "/questionnaire");
}

#[tokio::test]
async fn test_admin_pages_refuse_regular_users() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.sign_up_and_in("Dana", "dana@example.com").await;

    let response = client.get("/admin").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_message_reaches_user_updates() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.register("Dana", "dana@example.com").await;
    client.sign_up_and_in("Admin", ADMIN_EMAIL).await;

    let admin_page = body_text(client.get("/admin").await).await;
    assert!(admin_page.contains("dana@example.com"));

    let token = client.csrf_token("/admin/users/1").await;
    let response = client
        .post_form(
            "/admin/users/1",
            &[("title", "מלגה חדשה"), ("body", "כדאי לבדוק"), ("csrf_token", &token)],
        )
        .await;
    assert_eq!(location(&response), "/admin/users/1");

    client.get("/logout").await;
    client.login("dana@example.com", PASSWORD).await;

    let updates = body_text(client.get("/updates").await).await;
    assert!(updates.contains("מלגה חדשה"));
    assert!(updates.contains(r#"class="badge">1<"#));
}

#[tokio::test]
async fn test_admin_export_downloads_workbook() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;
    client.sign_up_and_in("Admin", ADMIN_EMAIL).await;

    let response = client.get("/admin/export/users").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"users.xlsx\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn test_alerts_feed_requires_bearer_token() {
    let mut client = TestClient::new(catalog_source(), accepting_notifier()).await;

    let response = client.get("/api/alerts-feed").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::get("/api/alerts-feed")
        .header(header::AUTHORIZATION, "Bearer feed-token")
        .body(Body::empty())
        .unwrap();
    let response = client.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["data"], serde_json::json!([]));
}
