use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::load_viewer;
use crate::state::AppState;

/// Profile images up to this size
const UPLOAD_LIMIT_BYTES: usize = 5 * 1024 * 1024;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // Pages anyone can see
    let public_routes = Router::new()
        .route("/", get(handlers::pages::index))
        .route("/about", get(handlers::pages::about))
        .route(
            "/register",
            get(handlers::auth::register_page).post(handlers::auth::register_submit),
        )
        .route(
            "/login",
            get(handlers::auth::login_page).post(handlers::auth::login_submit),
        )
        .route("/logout", get(handlers::auth::logout));

    // Signed-in users; the extractors redirect anonymous visitors to /login
    let account_routes = Router::new()
        .route("/dashboard", get(handlers::dashboard::dashboard_index))
        .route(
            "/contact",
            get(handlers::forms::contact_page).post(handlers::forms::contact_submit),
        )
        .route(
            "/send",
            get(handlers::forms::send_page).post(handlers::forms::send_submit),
        )
        .route(
            "/questionnaire",
            get(handlers::questionnaire::questionnaire_page)
                .post(handlers::questionnaire::questionnaire_submit),
        )
        .route(
            "/profile",
            get(handlers::profile::profile_page)
                .post(handlers::profile::profile_submit)
                .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/scholarships", get(handlers::scholarships::catalog))
        .route(
            "/my-scholarships",
            get(handlers::scholarships::my_scholarships)
                .post(handlers::scholarships::update_scholarship),
        )
        .route(
            "/my-scholarships/refresh",
            post(handlers::scholarships::refresh_matches),
        )
        .route("/updates", get(handlers::updates::updates))
        .route("/updates/mark-all", post(handlers::updates::mark_all_read));

    let admin_routes = Router::new()
        .route("/admin", get(handlers::admin::admin_index))
        .route("/admin/test-make", post(handlers::admin::test_make))
        .route("/admin/run-digest", post(handlers::admin::run_digest))
        .route(
            "/admin/scholarships/:id/analytics",
            get(handlers::admin::scholarship_analytics),
        )
        .route(
            "/admin/users/:id",
            get(handlers::admin::user_detail).post(handlers::admin::message_user),
        )
        .route("/admin/export/users", get(handlers::admin::export_users));

    // Machine-facing endpoints, no session
    let api_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .route("/api/alerts-feed", get(handlers::alerts::alerts_feed));

    let timeout = Duration::from_secs(state.config.server.request_timeout_seconds);

    Router::new()
        .merge(public_routes)
        .merge(account_routes)
        .merge(admin_routes)
        .fallback(handlers::pages::not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), load_viewer))
        .merge(api_routes)
        .nest_service("/static", ServeDir::new(&state.config.server.static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}
