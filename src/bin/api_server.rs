// HTTP API server binary for catalog-sync
// Accepts bulk catalog pushes from store ERPs

use anyhow::Result;
use catalog_sync::api::{ApiServer, AppState};
use catalog_sync::config::SyncConfig;
use catalog_sync::database_ops::Db;
use catalog_sync::telemetry::{init_tracing, LogFormat};
use catalog_sync::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();
    init_tracing("info,sqlx=warn", LogFormat::from_env())?;

    tracing::info!("Initializing catalog-sync API server");
    env_util::preflight_check(
        "api_server",
        &["API_SECRET"],
        &["DATABASE_URL", "DB_HOST", "API_HOST", "API_PORT", "LOG_FORMAT"],
    )?;

    // Load configuration from environment
    let server = ApiServer::from_env()?;
    let config = SyncConfig::from_env();

    // Initialize database connection
    let db = Db::connect(env_util::db_connect_options()?, server.max_db_connections).await?;
    tracing::info!("Database connected successfully");

    server.run(AppState::postgres(db, &config)).await?;

    Ok(())
}
