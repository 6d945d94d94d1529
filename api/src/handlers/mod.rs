pub mod admin;
pub mod alerts;
pub mod auth;
pub mod dashboard;
pub mod forms;
pub mod health;
pub mod metrics;
pub mod pages;
pub mod profile;
pub mod questionnaire;
pub mod scholarships;
pub mod updates;

// Common response types and helpers
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::ValidationError;
use common::make::{MakeEvent, MakePayload};
use serde::Serialize;
use tera::Context;

use crate::session::Viewer;
use crate::state::AppState;

/// JSON error body for the machine-facing endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

/// `{"data": ...}` envelope
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Template context for a form, with field errors when validation failed
pub fn form_context(form: &impl Serialize, errors: Option<&ValidationError>) -> Context {
    let mut context = Context::new();
    context.insert("form", form);
    if let Some(errors) = errors {
        context.insert("errors", &errors.fields);
    }
    context
}

pub fn csrf_ok(state: &AppState, viewer: &Viewer, token: &str) -> bool {
    viewer.verify_csrf(&state.config.server.secret_key, token)
}

/// Post a `user_registered` email through Make; failures are logged, never surfaced
pub async fn send_registration_email(
    state: &AppState,
    email: &str,
    html: String,
    subject: &str,
    is_test: bool,
) {
    let payload = match MakePayload::build(
        email,
        MakeEvent::UserRegistered,
        html,
        subject,
        is_test,
        &state.config.make.test_email,
    ) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Registration email not built");
            return;
        }
    };

    if let Err(e) = state.notifier.notify(&payload).await {
        tracing::warn!(error = %e, is_test = is_test, "Registration email not delivered");
    }
}
