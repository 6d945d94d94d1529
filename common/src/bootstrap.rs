// Bootstrap utilities shared by the api and scheduler binaries

use crate::config::Settings;
use crate::db::repositories::{JobRunRepository, UserRepository, UserScholarshipRepository};
use crate::db::DbPool;
use crate::digest::DigestService;
use crate::make::{MakeClient, Notifier};
use crate::notion::{NotionClient, ScholarshipSource};
use crate::schedule::DailySchedule;
use crate::scheduler::DigestScheduler;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Load and validate settings; call `Settings::log_warnings` once logging is up
pub fn load_settings() -> Result<Settings> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(settings)
}

/// Connect to Postgres or the SQLite fallback and run migrations
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    let db_pool = DbPool::connect_and_migrate(&settings.database)
        .await
        .context("Failed to initialize database pool")?;
    info!(kind = ?db_pool.kind(), "Database ready");
    Ok(db_pool)
}

/// Notion client; missing credentials surface later as a user-visible message
pub fn init_notion_source(settings: &Settings) -> Result<Arc<dyn ScholarshipSource>> {
    let client =
        NotionClient::new(settings.notion.clone()).context("Failed to create Notion client")?;
    Ok(Arc::new(client))
}

/// Make webhook client; deliveries are skipped while unconfigured
pub fn init_make_client(settings: &Settings) -> Result<Arc<MakeClient>> {
    let client = MakeClient::new(settings.make.clone()).context("Failed to create Make client")?;
    Ok(Arc::new(client))
}

pub fn build_digest_service(
    settings: &Settings,
    db_pool: &DbPool,
    source: Arc<dyn ScholarshipSource>,
    notifier: Arc<dyn Notifier>,
) -> Result<DigestService> {
    let schedule =
        DailySchedule::from_config(&settings.scheduler).context("Invalid digest schedule")?;
    Ok(DigestService::new(
        source,
        notifier,
        UserRepository::new(db_pool.clone()),
        UserScholarshipRepository::new(db_pool.clone()),
        JobRunRepository::new(db_pool.clone()),
        schedule,
        settings.admin.normalized_email(),
        settings.make.test_email.clone(),
    ))
}

pub fn build_digest_scheduler(
    settings: &Settings,
    digest: DigestService,
) -> Result<DigestScheduler> {
    let schedule =
        DailySchedule::from_config(&settings.scheduler).context("Invalid digest schedule")?;
    info!(
        cron = %schedule.expression(),
        timezone = %schedule.timezone(),
        "Digest scheduler configured"
    );
    Ok(DigestScheduler::new(digest, schedule)
        .with_run_on_startup(settings.scheduler.run_on_startup))
}

/// Resolve when the process receives Ctrl+C (and SIGTERM on unix)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
