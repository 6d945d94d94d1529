// Write every user to exports/users.xlsx

use std::path::Path;

use anyhow::{Context, Result};
use common::bootstrap;
use common::db::repositories::UserRepository;
use common::export;
use common::telemetry;

const EXPORT_DIR: &str = "exports";

#[tokio::main]
async fn main() -> Result<()> {
    let config = bootstrap::load_settings()?;
    telemetry::init_logging(&config.observability.log_level, config.observability.json_logs)?;

    let db_pool = bootstrap::init_database_pool(&config).await?;
    let users = UserRepository::new(db_pool.clone());

    let result = export::export_to_dir(&users, Path::new(EXPORT_DIR))
        .await
        .context("Failed to export users");
    db_pool.close().await;

    let (path, count) = result?;
    println!("Exported {} users to {}", count, path.display());
    Ok(())
}
