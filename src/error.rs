//! Error types shared by the catalog store and the reconciliation workflow.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failure inside a catalog store operation.
///
/// Uniqueness conflicts are not represented here: storage inserts report a
/// lost race as `Ok(None)` so callers can fall back to a lookup.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused the operation (closed, or a fault injected by a test).
    #[error("catalog store unavailable: {0}")]
    Unavailable(String),

    /// Find-or-create kept losing uniqueness races without ever finding the winner.
    #[error("gave up after repeated uniqueness conflicts: {0}")]
    Contention(String),
}

/// The step of a push that was running when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Begin,
    Store,
    Category,
    Tax,
    Product,
    StoreListing,
    Variation,
    TaxLink,
    Commit,
}

impl SyncStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "transaction begin",
            Self::Store => "store upsert",
            Self::Category => "category upsert",
            Self::Tax => "tax upsert",
            Self::Product => "product upsert",
            Self::StoreListing => "store product upsert",
            Self::Variation => "variation upsert",
            Self::TaxLink => "tax link",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by a catalog push. Any of them means nothing was persisted.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The payload was rejected before any mutation.
    #[error("invalid catalog payload: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The payload points at an entity that neither it nor the store defines.
    #[error("{stage} failed: unknown {kind} '{reference}'")]
    UnknownReference {
        stage: SyncStage,
        kind: &'static str,
        reference: String,
    },

    #[error("catalog push failed during {stage}")]
    Stage {
        stage: SyncStage,
        #[source]
        source: StoreError,
    },

    #[error("catalog push timed out after {0:?}")]
    Timeout(Duration),
}

impl SyncError {
    pub fn stage(&self) -> Option<SyncStage> {
        match self {
            Self::Stage { stage, .. } | Self::UnknownReference { stage, .. } => Some(*stage),
            Self::Validation(_) | Self::Timeout(_) => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnknownReference { .. })
    }
}

/// Tags a store result with the stage it belongs to.
pub(crate) trait StageExt<T> {
    fn at(self, stage: SyncStage) -> Result<T, SyncError>;
}

impl<T> StageExt<T> for Result<T, StoreError> {
    fn at(self, stage: SyncStage) -> Result<T, SyncError> {
        self.map_err(|source| SyncError::Stage { stage, source })
    }
}
