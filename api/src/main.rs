use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use api::{create_router, templates, AppState};
use common::bootstrap;
use common::scheduler::Scheduler;
use common::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let config = bootstrap::load_settings()?;
    telemetry::init_logging(&config.observability.log_level, config.observability.json_logs)?;
    config.log_warnings();

    tracing::info!("Starting API server");
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Configuration loaded"
    );

    let metrics_handle = telemetry::init_metrics()?;

    let db_pool = bootstrap::init_database_pool(&config).await?;
    let source = bootstrap::init_notion_source(&config)?;
    let notifier = bootstrap::init_make_client(&config)?;

    let tera = templates::load(&config.server.templates_dir)
        .with_context(|| format!("Failed to load templates from {}", config.server.templates_dir))?;

    let state = AppState::new(config.clone(), db_pool.clone(), tera, source, notifier)?
        .with_metrics(metrics_handle);

    // In-process daily digest unless DISABLE_SCHEDULER=1
    let scheduler = if config.scheduler.enabled {
        let scheduler = Arc::new(bootstrap::build_digest_scheduler(&config, state.digest.clone())?);
        let runner = scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.start().await {
                tracing::error!(error = %e, "Digest scheduler stopped with error");
            }
        });
        Some(scheduler)
    } else {
        tracing::info!("Digest scheduler disabled");
        None
    };

    let app = create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(bootstrap::shutdown_signal())
        .await?;

    tracing::info!("Initiating graceful shutdown");
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    db_pool.close().await;

    tracing::info!("API server stopped");
    Ok(())
}
