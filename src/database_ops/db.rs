use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Row,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env::env_flag;

const MIGRATIONS_DIR: &str = "./migrations";

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: connect options carry credentials; keep them out of spans.
    #[instrument(skip(options))]
    pub async fn connect(options: PgConnectOptions, max_connections: u32) -> Result<Self> {
        let db = Self::connect_no_migrate(options, max_connections).await?;

        // Off by default so the service can start against a schema managed elsewhere.
        if env_flag("AUTO_MIGRATE", false) {
            info!("running migrations (AUTO_MIGRATE=on)");
            db.run_migrations().await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(db)
    }

    /// Pool only; never touches the schema.
    #[instrument(skip(options))]
    pub async fn connect_no_migrate(options: PgConnectOptions, max_connections: u32) -> Result<Self> {
        let mut options = options;
        if !env_flag("USE_PREPARED", false) {
            // PgBouncer txn mode safe
            options = options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .context("connecting to postgres")?;
        info!(max_connections, "connected to db");
        Ok(Self { pool })
    }

    /// Applies every `NNNN_name.sql` file under `./migrations` not yet recorded
    /// in `_catalog_migrations`, in version order. Returns how many ran.
    pub async fn run_migrations(&self) -> Result<usize> {
        self.run_migrations_from(Path::new(MIGRATIONS_DIR)).await
    }

    pub async fn run_migrations_from(&self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            info!(dir = %dir.display(), "no migrations directory; nothing to apply");
            return Ok(0);
        }
        // raw_sql keeps these off the prepared-statement path (PgBouncer).
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _catalog_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT,
                installed_at TIMESTAMPTZ DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await?;

        let mut applied: HashSet<i64> = HashSet::new();
        for r in sqlx::raw_sql("SELECT version FROM _catalog_migrations")
            .fetch_all(&self.pool)
            .await?
        {
            applied.insert(r.try_get::<i64, _>(0)?);
        }

        let mut ran = 0;
        for migration in migration_files(dir)? {
            if !applied.insert(migration.version) {
                continue;
            }
            let sql = std::fs::read_to_string(&migration.path)
                .with_context(|| format!("reading {}", migration.path.display()))?;
            info!(version = migration.version, file = ?migration.path, "applying migration");

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(&sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {} failed", migration.version))?;
            sqlx::query("INSERT INTO _catalog_migrations (version, description) VALUES ($1, $2)")
                .persistent(false)
                .bind(migration.version)
                .bind(&migration.description)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            ran += 1;
        }
        info!(applied = ran, "migrations up-to-date");
        Ok(ran)
    }
}

#[derive(Debug)]
struct Migration {
    version: i64,
    description: String,
    path: PathBuf,
}

fn migration_files(dir: &Path) -> Result<Vec<Migration>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some((version, description)) = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(parse_migration_name)
        else {
            continue;
        };
        out.push(Migration {
            version,
            description,
            path,
        });
    }
    out.sort_by_key(|m| m.version);
    Ok(out)
}

/// `0001_catalog.sql` -> `(1, "catalog")`. Anything else is ignored.
fn parse_migration_name(fname: &str) -> Option<(i64, String)> {
    let stem = fname.strip_suffix(".sql")?;
    let digits = stem.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let (num, rest) = stem.split_at(digits);
    let description = rest.strip_prefix('_')?;
    Some((num.parse().ok()?, description.to_string()))
}
