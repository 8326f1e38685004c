//! Reconciles bulk product feeds from independent store ERPs into one shared,
//! deduplicated catalog while keeping pricing, stock and taxes per store.

pub mod api;
pub mod catalog;
pub mod config;
pub mod database_ops;
pub mod error;
pub mod normalization;
pub mod telemetry;

pub mod util {
    pub mod env;
}

pub use catalog::{CatalogPush, CatalogReconciler, PushSummary};
pub use error::{StoreError, SyncError, SyncStage};
