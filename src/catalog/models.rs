//! Structured records exchanged between the reconciliation workflow and the catalog store.

use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value;

use crate::normalization::DerivedName;

/// Row identifier used by every catalog table.
pub type Id = i64;

/// Whether an upsert inserted a new row or rewrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl UpsertOutcome {
    pub fn is_created(self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Store metadata; `external_id` is the ERP's identifier for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    pub external_id: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Store-scoped category, unique per (store, external id).
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRecord {
    pub external_id: String,
    pub name: String,
    pub parent_external_id: Option<String>,
}

/// Store-scoped tax definition, unique per (store, external id).
#[derive(Debug, Clone, PartialEq)]
pub struct TaxRecord {
    pub external_id: String,
    pub name: String,
    pub rate: BigDecimal,
    pub is_inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBrand {
    pub name: String,
    pub normalized_name: String,
    pub slug: String,
}

/// Every column a push writes on a product. The name-derived columns travel
/// inside [`DerivedName`] so they are always written together with `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductWrite {
    pub name: String,
    pub derived: DerivedName,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Id>,
    pub brand_id: Option<Id>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub ean: Option<String>,
    pub unit: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub is_customizable: bool,
    pub is_addon: bool,
    /// ERP-specific fields with no dedicated column.
    pub attributes: Value,
}

impl ProductWrite {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            derived: DerivedName::of(&name),
            name,
            slug: None,
            description: None,
            category_id: None,
            brand_id: None,
            sku: None,
            barcode: None,
            ean: None,
            unit: None,
            is_active: true,
            is_featured: false,
            is_customizable: false,
            is_addon: false,
            attributes: Value::Object(Default::default()),
        }
    }
}

/// Active product sharing a name key, with its extracted sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedCandidate {
    pub id: Id,
    pub volume_ml: Option<f64>,
    pub weight_g: Option<f64>,
}

/// Active product considered by the fuzzy layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCandidate {
    pub id: Id,
    pub name: String,
}

/// Store-scoped listing of a product, keyed by (store, external id).
#[derive(Debug, Clone, PartialEq)]
pub struct ListingWrite {
    pub store_id: Id,
    pub product_id: Id,
    pub external_id: String,
    pub price: BigDecimal,
    pub currency: Option<String>,
    pub stock_quantity: i64,
    pub is_available: bool,
}

/// Variation of a store listing, keyed by (store listing, name).
#[derive(Debug, Clone, PartialEq)]
pub struct VariationWrite {
    pub store_listing_id: Id,
    pub external_id: Option<String>,
    pub name: String,
    pub display_name: Option<String>,
    pub price: BigDecimal,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingTaxLink {
    pub store_listing_id: Id,
    pub tax_id: Id,
    pub rate_override: Option<BigDecimal>,
}
