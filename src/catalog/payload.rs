//! Wire shape of a bulk catalog push and its aggregate result.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::SyncError;

/// Decimal amount accepted as either a JSON number or a numeric string.
///
/// Numbers are read through their textual form so `12.99` stays exactly `12.99`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "AmountRepr")]
pub struct Amount(pub BigDecimal);

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Number(serde_json::Number),
    Text(String),
}

impl TryFrom<AmountRepr> for Amount {
    type Error = String;

    fn try_from(repr: AmountRepr) -> Result<Self, Self::Error> {
        let text = match repr {
            AmountRepr::Number(n) => n.to_string(),
            AmountRepr::Text(s) => s,
        };
        BigDecimal::from_str(text.trim())
            .map(Amount)
            .map_err(|e| format!("invalid decimal '{text}': {e}"))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<BigDecimal> for Amount {
    fn from(value: BigDecimal) -> Self {
        Self(value)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPush {
    pub store_details: StoreDetails,
    #[serde(default)]
    pub categories: Vec<CategoryPayload>,
    #[serde(default)]
    pub taxes: Vec<TaxPayload>,
    #[serde(default)]
    pub products: Vec<ProductPayload>,
    #[serde(default)]
    pub variations: Vec<VariationPayload>,
    /// Explicit listing data; listings are derived from `products` when absent.
    #[serde(default)]
    pub store_products: Vec<StoreProductPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDetails {
    #[serde(alias = "store_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPayload {
    #[serde(alias = "category_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxPayload {
    #[serde(alias = "tax_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub rate: Amount,
    #[serde(default)]
    pub is_inclusive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPayload {
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub ean: Option<String>,
    #[serde(default)]
    pub price: Option<Amount>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub tax_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_customizable: bool,
    #[serde(default)]
    pub is_addon: bool,
    /// Any ERP field not listed above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProductPayload {
    pub fn new(external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            sku: None,
            slug: None,
            description: None,
            category_id: None,
            brand: None,
            barcode: None,
            ean: None,
            price: None,
            currency: None,
            unit: None,
            tax_ids: Vec::new(),
            is_active: true,
            is_featured: false,
            is_customizable: false,
            is_addon: false,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationPayload {
    #[serde(default)]
    pub external_id: Option<String>,
    pub product_external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub price: Option<Amount>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreProductPayload {
    pub product_external_id: String,
    /// Listing identifier; the product's external id is used when absent.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub price: Option<Amount>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub is_available: Option<bool>,
    #[serde(default)]
    pub tax_ids: Vec<String>,
    /// Per-tax rate overrides keyed by tax id.
    #[serde(default)]
    pub tax_rates: BTreeMap<String, Amount>,
}

/// Aggregate counts reported back to the pushing ERP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummary {
    pub products_created: usize,
    pub products_updated: usize,
    pub variations_processed: usize,
    pub store_products_processed: usize,
    pub taxes_processed: usize,
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn is_negative(amount: &Option<Amount>) -> bool {
    amount.as_ref().is_some_and(|a| a.0 < BigDecimal::from(0))
}

impl CatalogPush {
    /// Checks the payload without touching storage; every problem is reported at once.
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut problems = Vec::new();
        let store = &self.store_details;
        if is_blank(&store.id) {
            problems.push("store_details.id is required".to_string());
        }
        if is_blank(&store.name) {
            problems.push("store_details.name is required".to_string());
        }
        match (store.latitude, store.longitude) {
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    problems.push(format!("store_details coordinates out of range: {lat},{lng}"));
                }
            }
            _ => problems.push("store_details.latitude and longitude are required".to_string()),
        }

        for (idx, category) in self.categories.iter().enumerate() {
            if is_blank(&category.id) {
                problems.push(format!("categories[{idx}].id is required"));
            }
        }
        for (idx, tax) in self.taxes.iter().enumerate() {
            if is_blank(&tax.id) {
                problems.push(format!("taxes[{idx}].id is required"));
            }
        }

        if self.products.is_empty() {
            problems.push("products must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for (idx, product) in self.products.iter().enumerate() {
            if is_blank(&product.external_id) {
                problems.push(format!("products[{idx}].external_id is required"));
            } else if !seen.insert(product.external_id.trim()) {
                problems.push(format!(
                    "products[{idx}].external_id '{}' is duplicated",
                    product.external_id
                ));
            }
            if is_blank(&product.name) {
                problems.push(format!("products[{idx}].name is required"));
            }
            if is_negative(&product.price) {
                problems.push(format!("products[{idx}].price must not be negative"));
            }
        }

        for (idx, variation) in self.variations.iter().enumerate() {
            if !seen.contains(variation.product_external_id.trim()) {
                problems.push(format!(
                    "variations[{idx}] references unknown product '{}'",
                    variation.product_external_id
                ));
            }
            if is_blank(&variation.name) {
                problems.push(format!("variations[{idx}].name is required"));
            }
            if is_negative(&variation.price) {
                problems.push(format!("variations[{idx}].price must not be negative"));
            }
        }

        let mut listing_ids = HashSet::new();
        for (idx, listing) in self.store_products.iter().enumerate() {
            if !seen.contains(listing.product_external_id.trim()) {
                problems.push(format!(
                    "store_products[{idx}] references unknown product '{}'",
                    listing.product_external_id
                ));
            } else if !listing_ids.insert(listing.product_external_id.trim()) {
                problems.push(format!(
                    "store_products[{idx}] repeats product '{}'",
                    listing.product_external_id
                ));
            }
            if is_negative(&listing.price) {
                problems.push(format!("store_products[{idx}].price must not be negative"));
            }
            if listing.stock_quantity.is_some_and(|q| q < 0) {
                problems.push(format!("store_products[{idx}].stock_quantity must not be negative"));
            }
        }

        // Each product owns one listing keyed by (store, external id); two
        // products sharing a key would rewrite each other's listing.
        let explicit_ids: HashMap<&str, &str> = self
            .store_products
            .iter()
            .filter_map(|sp| {
                let id = sp.external_id.as_deref().map(str::trim)?;
                (!id.is_empty()).then_some((sp.product_external_id.trim(), id))
            })
            .collect();
        let mut products_seen = HashSet::new();
        let mut listing_keys = HashSet::new();
        for (idx, product) in self.products.iter().enumerate() {
            let external_id = product.external_id.trim();
            if external_id.is_empty() || !products_seen.insert(external_id) {
                continue;
            }
            let key = explicit_ids.get(external_id).copied().unwrap_or(external_id);
            if !listing_keys.insert(key) {
                problems.push(format!(
                    "products[{idx}] listing external_id '{key}' is already used by another product"
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Validation(problems))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "store_details": { "id": "store-1", "name": "Corner Shop", "latitude": 1.3, "longitude": 103.8 },
            "products": [
                { "external_id": "p1", "name": "Fresh Milk 1L", "price": 12.99, "pack_size": "6" }
            ]
        })
    }

    #[test]
    fn decodes_minimal_push_with_defaults() {
        let push: CatalogPush = serde_json::from_value(minimal()).unwrap();
        assert!(push.validate().is_ok());
        let product = &push.products[0];
        assert!(product.is_active);
        assert_eq!(product.price, Some(Amount(BigDecimal::from_str("12.99").unwrap())));
        assert_eq!(product.extra.get("pack_size"), Some(&json!("6")));
        assert!(push.store_products.is_empty());
    }

    #[test]
    fn amounts_accept_strings() {
        let amount: Amount = serde_json::from_value(json!("4.50")).unwrap();
        assert_eq!(amount.to_string(), "4.50");
        assert!(serde_json::from_value::<Amount>(json!("four")).is_err());
    }

    #[test]
    fn validation_collects_all_problems() {
        let mut raw = minimal();
        raw["store_details"]["name"] = json!("");
        raw["store_details"]["latitude"] = Value::Null;
        raw["products"] = json!([
            { "external_id": "p1", "name": "Milk" },
            { "external_id": "p1", "name": "" }
        ]);
        raw["variations"] = json!([{ "product_external_id": "ghost", "name": "Large" }]);
        let push: CatalogPush = serde_json::from_value(raw).unwrap();

        let Err(SyncError::Validation(problems)) = push.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(problems.len(), 5, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("duplicated")));
        assert!(problems.iter().any(|p| p.contains("unknown product 'ghost'")));
    }

    #[test]
    fn listing_ids_must_not_collide_across_products() {
        let mut raw = minimal();
        raw["products"] = json!([
            { "external_id": "p1", "name": "Basmati Rice 5kg" },
            { "external_id": "p2", "name": "Orange Juice 1L" }
        ]);
        raw["store_products"] = json!([{ "product_external_id": "p1", "external_id": "p2" }]);
        let push: CatalogPush = serde_json::from_value(raw).unwrap();

        let Err(SyncError::Validation(problems)) = push.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(problems.len(), 1, "{problems:?}");
        assert!(problems[0].contains("listing external_id 'p2'"));
    }

    #[test]
    fn explicit_listing_id_may_differ_from_product_id() {
        let mut raw = minimal();
        raw["products"] = json!([
            { "external_id": "p1", "name": "Basmati Rice 5kg" },
            { "external_id": "p2", "name": "Orange Juice 1L" }
        ]);
        raw["store_products"] = json!([
            { "product_external_id": "p1", "external_id": "p2" },
            { "product_external_id": "p2", "external_id": "erp-2" }
        ]);
        let push: CatalogPush = serde_json::from_value(raw).unwrap();
        assert!(push.validate().is_ok());
    }

    #[test]
    fn empty_product_list_is_rejected() {
        let mut raw = minimal();
        raw["products"] = json!([]);
        let push: CatalogPush = serde_json::from_value(raw).unwrap();
        assert!(push.validate().unwrap_err().is_client_error());
    }
}
