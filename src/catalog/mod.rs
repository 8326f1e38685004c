//! Catalog reconciliation: payload decoding, brand resolution, product
//! matching and the transactional push workflow.

pub mod brand;
pub mod matcher;
pub mod models;
pub mod payload;
pub mod reconcile;

pub use brand::resolve_brand;
pub use matcher::{MatchQuery, MatchType, ProductMatch, ProductMatcher};
pub use payload::{CatalogPush, PushSummary};
pub use reconcile::CatalogReconciler;
