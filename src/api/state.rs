use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::CatalogReconciler;
use crate::config::SyncConfig;
use crate::database_ops::{CatalogStore, Db, PgCatalogStore};

/// Shared application state handed to every handler.
pub struct AppState {
    pub reconciler: CatalogReconciler,
    pub push_timeout: Duration,
    /// Present when the catalog lives in Postgres; used by the health probe.
    pub db: Option<Db>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn CatalogStore>, config: &SyncConfig, db: Option<Db>) -> Self {
        Self {
            reconciler: CatalogReconciler::new(store, config),
            push_timeout: config.push_timeout,
            db,
            started_at: Instant::now(),
        }
    }

    pub fn postgres(db: Db, config: &SyncConfig) -> Self {
        let store = PgCatalogStore::new(&db, config);
        Self::new(Arc::new(store), config, Some(db))
    }
}
