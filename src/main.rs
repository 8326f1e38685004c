use anyhow::{Context, Result};
use catalog_sync::api::models::MatchResponse;
use catalog_sync::catalog::{CatalogPush, CatalogReconciler, MatchQuery};
use catalog_sync::config::SyncConfig;
use catalog_sync::database_ops::{CatalogStore, Db, MemoryCatalog, PgCatalogStore};
use catalog_sync::telemetry::{init_tracing, LogFormat};
use catalog_sync::util::env;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog-sync", version, about = "Shared product catalog reconciliation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Reconcile a bulk catalog push read from a JSON file
    Push {
        file: PathBuf,
        /// Run against an empty in-memory catalog; nothing touches the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Ask the matcher which existing product an item would resolve to
    Match {
        #[arg(long)]
        name: String,
        #[arg(long)]
        barcode: Option<String>,
        #[arg(long)]
        ean: Option<String>,
        #[arg(long)]
        sku: Option<String>,
        /// ERP store identifier, enables the store-mapping layer with --external-id
        #[arg(long)]
        store: Option<String>,
        #[arg(long)]
        external_id: Option<String>,
    },
    /// Apply pending SQL migrations from ./migrations
    Migrate,
}

async fn connect(max_connections: u32) -> Result<Db> {
    let options = env::db_connect_options()?;
    Db::connect(options, max_connections).await
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info,sqlx=warn", LogFormat::from_env())?;

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command {
        Commands::Push { file, dry_run } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let payload: CatalogPush = serde_json::from_str(&raw)
                .with_context(|| format!("decoding catalog push from {}", file.display()))?;

            let store: Arc<dyn CatalogStore> = if dry_run {
                info!("dry run against an empty in-memory catalog");
                Arc::new(MemoryCatalog::new())
            } else {
                let db = connect(2).await?;
                Arc::new(PgCatalogStore::new(&db, &config))
            };
            let reconciler = CatalogReconciler::new(store, &config);
            let summary = reconciler
                .push_catalog_within(&payload, config.push_timeout)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Match {
            name,
            barcode,
            ean,
            sku,
            store,
            external_id,
        } => {
            let db = connect(1).await?;
            let reconciler = CatalogReconciler::new(
                Arc::new(PgCatalogStore::new(&db, &config)),
                &config,
            );
            let query = MatchQuery {
                name: &name,
                barcode: barcode.as_deref(),
                sku: sku.as_deref(),
                ean: ean.as_deref(),
                store_id: None,
                external_id: external_id.as_deref(),
            };
            let found = reconciler.match_product(store.as_deref(), query).await?;
            println!("{}", serde_json::to_string_pretty(&MatchResponse::from(found))?);
        }
        Commands::Migrate => {
            let db = Db::connect_no_migrate(env::db_connect_options()?, 1).await?;
            let applied = db.run_migrations().await?;
            info!(applied, "migrate: done");
        }
    }

    Ok(())
}
