// Standalone daily digest scheduler
//
// For deployments that run the digest outside the web process. Start only one
// instance: runs are not coordinated across processes.

use common::bootstrap;
use common::scheduler::Scheduler;
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = bootstrap::load_settings()?;
    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;
    settings.log_warnings();

    info!("Starting scholarship digest scheduler");

    let db_pool = bootstrap::init_database_pool(&settings).await?;
    let source = bootstrap::init_notion_source(&settings)?;
    let notifier = bootstrap::init_make_client(&settings)?;
    let digest = bootstrap::build_digest_service(&settings, &db_pool, source, notifier)?;
    let scheduler = Arc::new(bootstrap::build_digest_scheduler(&settings, digest)?);

    let scheduler_for_shutdown = scheduler.clone();
    tokio::spawn(async move {
        bootstrap::shutdown_signal().await;
        info!("Initiating graceful shutdown");
        scheduler_for_shutdown.stop().await;
    });

    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Scheduler error");
        db_pool.close().await;
        return Err(e.into());
    }

    db_pool.close().await;
    info!("Scheduler stopped");
    Ok(())
}
