use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
};

use super::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> &str {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    value.strip_prefix("Bearer ").unwrap_or(value).trim()
}

/// Alert subscriptions for the external notifier, guarded by a shared bearer token
#[tracing::instrument(skip_all)]
pub async fn alerts_feed(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let expected = state
        .config
        .admin
        .alerts_feed_token
        .as_deref()
        .filter(|t| !t.is_empty());

    match expected {
        Some(token) if bearer_token(&headers) == token => {}
        _ => {
            tracing::warn!("Alerts feed request rejected");
            return ErrorResponse::new("unauthorized").into_response();
        }
    }

    match state.scholarships.alerts_feed().await {
        Ok(rows) => SuccessResponse::new(rows).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Alerts feed query failed");
            ErrorResponse::new("internal_error")
                .with_message(e.to_string())
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), "");
        headers.insert(AUTHORIZATION, "Bearer abc123 ".parse().unwrap());
        assert_eq!(bearer_token(&headers), "abc123");
        headers.insert(AUTHORIZATION, "abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), "abc123");
    }
}
