use std::time::Duration;

use crate::normalization::similarity::SimilarityKind;
use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.45;
pub const DEFAULT_SIZE_TOLERANCE: f64 = 10.0;
pub const DEFAULT_CANDIDATE_LIMIT: i64 = 50;

/// Tunables for matching and push execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Fuzzy candidates must score strictly above this (0-1 scale).
    pub fuzzy_threshold: f64,
    /// Maximum |incoming - existing| for the name+volume and name+weight layers (ml / g).
    pub size_tolerance: f64,
    pub similarity: SimilarityKind,
    /// Upper bound on similarity candidates fetched from storage per item.
    pub candidate_limit: i64,
    /// Wall-clock bound for one push, enforced by the HTTP layer.
    pub push_timeout: Duration,
    /// Per-statement bound applied inside the push transaction.
    pub statement_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            size_tolerance: DEFAULT_SIZE_TOLERANCE,
            similarity: SimilarityKind::Trigram,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            push_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_millis(15_000),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let fuzzy_threshold = env_parse("MATCH_FUZZY_THRESHOLD", defaults.fuzzy_threshold);
        let size_tolerance = env_parse("MATCH_SIZE_TOLERANCE", defaults.size_tolerance);
        let similarity = env_opt("MATCH_SIMILARITY")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.similarity);
        let candidate_limit: i64 = env_parse("MATCH_CANDIDATE_LIMIT", defaults.candidate_limit);
        let push_timeout_secs: u64 = env_parse("PUSH_TIMEOUT_SECS", 30u64);
        let statement_timeout_ms: u64 = env_parse("PUSH_STATEMENT_TIMEOUT_MS", 15_000u64);

        Self {
            fuzzy_threshold: if (0.0..=1.0).contains(&fuzzy_threshold) {
                fuzzy_threshold
            } else {
                defaults.fuzzy_threshold
            },
            size_tolerance: if size_tolerance >= 0.0 {
                size_tolerance
            } else {
                defaults.size_tolerance
            },
            similarity,
            candidate_limit: candidate_limit.max(1),
            push_timeout: Duration::from_secs(push_timeout_secs.max(1)),
            statement_timeout: Duration::from_millis(statement_timeout_ms),
        }
    }
}
