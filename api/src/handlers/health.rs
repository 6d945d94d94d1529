use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub make_configured: bool,
    pub notion_configured: bool,
    pub admin_email_configured: bool,
}

/// Which integrations are configured; never touches them
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        make_configured: state.config.make.is_configured(),
        notion_configured: state.config.notion.is_configured(),
        admin_email_configured: state.admin_email().is_some(),
    })
}
