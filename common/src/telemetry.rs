// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over the configured level. JSON output is meant
/// for hosted deployments, the human format for local development.
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer().with_target(false).with_filter(env_filter).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, json = json, "Logging initialized");
    Ok(())
}

/// Install the Prometheus recorder and describe the application metrics
///
/// The returned handle renders the text exposition served at `/metrics`.
#[tracing::instrument(skip_all)]
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!("digest_runs_total", "Daily digest runs by outcome");
    describe_counter!(
        "make_deliveries_total",
        "Make webhook deliveries by event and result"
    );
    describe_counter!("notion_fetch_total", "Notion database queries by result");
    describe_histogram!(
        "notion_fetch_duration_seconds",
        "Duration of a full paginated Notion query"
    );
    describe_counter!("login_failures_total", "Failed login attempts");
    describe_counter!("registrations_total", "Completed user registrations");

    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

#[inline]
pub fn record_digest_run(outcome: &str) {
    counter!("digest_runs_total", "outcome" => outcome.to_string()).increment(1);
}

#[inline]
pub fn record_make_delivery(event: &str, result: &str) {
    counter!(
        "make_deliveries_total",
        "event" => event.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a Notion query and how long it took
#[inline]
pub fn record_notion_fetch(result: &str, duration_seconds: f64) {
    counter!("notion_fetch_total", "result" => result.to_string()).increment(1);
    histogram!("notion_fetch_duration_seconds").record(duration_seconds);
}

#[inline]
pub fn record_login_failure() {
    counter!("login_failures_total").increment(1);
}

#[inline]
pub fn record_registration() {
    counter!("registrations_total").increment(1);
}
