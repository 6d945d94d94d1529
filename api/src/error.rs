// Error type for HTML handlers

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use common::errors::{AuthError, DatabaseError, ExportError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "הבקשה אינה תקינה. רעננו את הדף ונסו שוב.",
            AppError::NotFound => "הדף לא נמצא.",
            _ => "אירעה שגיאה. נסו שוב מאוחר יותר.",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        let body = format!(
            r#"<!DOCTYPE html><html lang="he" dir="rtl"><head><meta charset="utf-8"><title>{code}</title></head><body><h1>{code}</h1><p>{message}</p><a href="/">לדף הבית</a></body></html>"#,
            code = status.as_u16(),
            message = self.user_message(),
        );
        (status, Html(body)).into_response()
    }
}
