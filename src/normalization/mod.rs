//! Name canonicalization, size extraction and string similarity for product matching.

pub mod product_name;
pub mod similarity;

pub use product_name::{
    compact_key, extract_volume_ml, extract_weight_g, name_key, normalize, slugify, DerivedName,
};
pub use similarity::{SimilarityKind, SimilarityScorer};
