// Make.com email webhook
//
// Emails are not sent by this service directly. A JSON payload is posted to a
// Make scenario which renders and delivers the message.

use crate::config::MakeConfig;
use crate::errors::NotifyError;
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::telemetry;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Events the Make scenario knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MakeEvent {
    UserRegistered,
    ScholarshipsDailyUpdate,
}

impl MakeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MakeEvent::UserRegistered => "user_registered",
            MakeEvent::ScholarshipsDailyUpdate => "scholarships_daily_update",
        }
    }
}

impl fmt::Display for MakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MakeEvent {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_registered" => Ok(MakeEvent::UserRegistered),
            "scholarships_daily_update" => Ok(MakeEvent::ScholarshipsDailyUpdate),
            other => Err(NotifyError::InvalidEvent(other.to_string())),
        }
    }
}

/// Body posted to the webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MakePayload {
    pub email: String,
    pub event_title: MakeEvent,
    pub is_test: bool,
    pub subject: String,
    pub html: String,
}

impl MakePayload {
    /// Validate and assemble a payload
    ///
    /// In test mode the message goes to `test_email` instead of `email`.
    ///
    /// # Errors
    /// `EmptyHtml` for blank html, `EmptyEmail` when the resolved recipient is blank
    pub fn build(
        email: &str,
        event: MakeEvent,
        html: impl Into<String>,
        subject: impl Into<String>,
        is_test: bool,
        test_email: &str,
    ) -> Result<Self, NotifyError> {
        let html = html.into();
        if html.trim().is_empty() {
            return Err(NotifyError::EmptyHtml);
        }

        let recipient = if is_test { test_email } else { email }.trim();
        if recipient.is_empty() {
            return Err(NotifyError::EmptyEmail);
        }

        Ok(Self {
            email: recipient.to_string(),
            event_title: event,
            is_test,
            subject: subject.into(),
            html,
        })
    }

    /// Like `build`, with the event given by name
    pub fn build_named(
        email: &str,
        event_title: &str,
        html: impl Into<String>,
        subject: impl Into<String>,
        is_test: bool,
        test_email: &str,
    ) -> Result<Self, NotifyError> {
        let event = MakeEvent::from_str(event_title)?;
        Self::build(email, event, html, subject, is_test, test_email)
    }
}

/// Result of a delivery that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Webhook url or key not configured
    Skipped,
}

/// Anything that can deliver a Make payload
#[mockall::automock]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &MakePayload) -> Result<Delivery, NotifyError>;
}

/// Posts payloads to the configured Make webhook
#[derive(Clone)]
pub struct MakeClient {
    client: Client,
    config: MakeConfig,
    retry: Arc<dyn RetryStrategy>,
}

impl MakeClient {
    pub fn new(config: MakeConfig) -> Result<Self, NotifyError> {
        let retry = Arc::new(ExponentialBackoff::with_attempts(config.max_attempts));
        Self::with_retry(config, retry)
    }

    pub fn with_retry(
        config: MakeConfig,
        retry: Arc<dyn RetryStrategy>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| NotifyError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn post_once(
        &self,
        url: &str,
        api_key: &str,
        payload: &MakePayload,
    ) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .header("x-make-apikey", api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for MakeClient {
    #[instrument(
        skip(self, payload),
        fields(event = %payload.event_title, is_test = payload.is_test)
    )]
    async fn notify(&self, payload: &MakePayload) -> Result<Delivery, NotifyError> {
        let (Some(url), Some(api_key)) = (
            self.config.webhook_url.as_deref().filter(|s| !s.is_empty()),
            self.config.api_key.as_deref().filter(|s| !s.is_empty()),
        ) else {
            tracing::warn!("Make webhook not configured; skipping event");
            telemetry::record_make_delivery(payload.event_title.as_str(), "skipped");
            return Ok(Delivery::Skipped);
        };

        let mut attempt = 1;
        loop {
            match self.post_once(url, api_key, payload).await {
                Ok(()) => {
                    tracing::info!(attempt = attempt, "Make webhook delivered");
                    telemetry::record_make_delivery(payload.event_title.as_str(), "ok");
                    return Ok(Delivery::Sent);
                }
                Err(e) => {
                    tracing::error!(attempt = attempt, error = %e, "Make webhook failed");
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            telemetry::record_make_delivery(payload.event_title.as_str(), "error");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_payload() {
        let payload = MakePayload::build(
            "  user@example.com ",
            MakeEvent::UserRegistered,
            "<p>hi</p>",
            "subject",
            false,
            "test@example.com",
        )
        .unwrap();
        assert_eq!(payload.email, "user@example.com");
        assert!(!payload.is_test);
    }

    #[test]
    fn test_test_mode_redirects_recipient() {
        let payload = MakePayload::build(
            "user@example.com",
            MakeEvent::ScholarshipsDailyUpdate,
            "<p>hi</p>",
            "[TEST] subject",
            true,
            "qa@example.com",
        )
        .unwrap();
        assert_eq!(payload.email, "qa@example.com");
        assert!(payload.is_test);
    }

    #[test]
    fn test_payload_rejects_blank_values() {
        assert!(matches!(
            MakePayload::build("a@b.co", MakeEvent::UserRegistered, "   ", "s", false, "t@t.co"),
            Err(NotifyError::EmptyHtml)
        ));
        assert!(matches!(
            MakePayload::build(" ", MakeEvent::UserRegistered, "<p>x</p>", "s", false, "t@t.co"),
            Err(NotifyError::EmptyEmail)
        ));
        assert!(matches!(
            MakePayload::build("a@b.co", MakeEvent::UserRegistered, "<p>x</p>", "s", true, ""),
            Err(NotifyError::EmptyEmail)
        ));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let err =
            MakePayload::build_named("a@b.co", "password_reset", "<p>x</p>", "s", false, "t@t.co")
                .unwrap_err();
        assert_eq!(err.to_string(), "Invalid event_title: password_reset");
    }

    #[test]
    fn test_payload_serialization() {
        let payload = MakePayload::build(
            "a@b.co",
            MakeEvent::ScholarshipsDailyUpdate,
            "<p>x</p>",
            "s",
            false,
            "t@t.co",
        )
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["event_title"], "scholarships_daily_update");
        assert_eq!(value["email"], "a@b.co");
        assert_eq!(value["is_test"], false);
    }

    #[tokio::test]
    async fn test_unconfigured_client_skips() {
        let client = MakeClient::new(MakeConfig::default()).unwrap();
        let payload = MakePayload::build(
            "a@b.co",
            MakeEvent::UserRegistered,
            "<p>x</p>",
            "s",
            false,
            "t@t.co",
        )
        .unwrap();
        assert_eq!(client.notify(&payload).await.unwrap(), Delivery::Skipped);
    }
}
