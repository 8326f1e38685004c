use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::brand::resolve_brand;
use crate::catalog::matcher::{MatchQuery, ProductMatch, ProductMatcher};
use crate::catalog::models::{
    CategoryRecord, Id, ListingTaxLink, ListingWrite, ProductWrite, StoreRecord, TaxRecord,
    VariationWrite,
};
use crate::catalog::payload::{CatalogPush, ProductPayload, PushSummary, StoreProductPayload};
use crate::config::SyncConfig;
use crate::database_ops::store::{CatalogStore, CatalogTx, StoreResult};
use crate::error::{StageExt, StoreError, SyncError, SyncStage};
use crate::normalization::slugify;

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn owned(value: Option<&String>) -> Option<String> {
    trimmed(value.map(String::as_str)).map(str::to_string)
}

/// Ids resolved while processing the store-scoped reference data of one push.
struct StoreScope {
    store_id: Id,
    categories: HashMap<String, Id>,
    taxes: HashMap<String, Id>,
}

/// A product of the payload after it has been written, with its listing.
struct Listed<'a> {
    product: &'a ProductPayload,
    explicit: Option<&'a StoreProductPayload>,
    listing_id: Id,
    listing_price: BigDecimal,
}

/// Applies bulk catalog pushes to a [`CatalogStore`].
pub struct CatalogReconciler {
    store: Arc<dyn CatalogStore>,
    matcher: ProductMatcher,
}

impl CatalogReconciler {
    pub fn new(store: Arc<dyn CatalogStore>, config: &SyncConfig) -> Self {
        Self::with_matcher(store, ProductMatcher::new(config))
    }

    pub fn with_matcher(store: Arc<dyn CatalogStore>, matcher: ProductMatcher) -> Self {
        Self { store, matcher }
    }

    /// Runs the matcher as a read-only query. Nothing is written; the
    /// transaction is dropped once the answer is known.
    ///
    /// `store` is the ERP's store identifier; an unknown store simply
    /// disables the store-mapping layer.
    pub async fn match_product(
        &self,
        store: Option<&str>,
        query: MatchQuery<'_>,
    ) -> StoreResult<Option<ProductMatch>> {
        let mut tx = self.store.begin().await?;
        let store_id = match trimmed(store) {
            Some(external) => tx.find_store(external).await?,
            None => None,
        };
        let query = MatchQuery { store_id, ..query };
        self.matcher.find_match(tx.as_mut(), &query).await
    }

    /// [`Self::push_catalog`] bounded by `limit`. An expired push is dropped
    /// mid-flight, which rolls its transaction back.
    pub async fn push_catalog_within(
        &self,
        payload: &CatalogPush,
        limit: Duration,
    ) -> Result<PushSummary, SyncError> {
        match tokio::time::timeout(limit, self.push_catalog(payload)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(store = %payload.store_details.id, ?limit, "catalog push timed out; rolled back");
                Err(SyncError::Timeout(limit))
            }
        }
    }

    /// Reconciles one push inside a single transaction.
    ///
    /// The payload is validated up front; after that every step writes through
    /// the same transaction, and the first failure drops it so nothing from
    /// this push is persisted.
    #[instrument(skip_all, fields(store = %payload.store_details.id, products = payload.products.len()))]
    pub async fn push_catalog(&self, payload: &CatalogPush) -> Result<PushSummary, SyncError> {
        payload.validate()?;

        let mut tx = self.store.begin().await.at(SyncStage::Begin)?;
        let summary = match self.apply(tx.as_mut(), payload).await {
            Ok(summary) => summary,
            Err(err) => {
                error!(stage = ?err.stage().map(SyncStage::as_str), error = %err, "catalog push rolled back");
                return Err(err);
            }
        };
        tx.commit().await.at(SyncStage::Commit).inspect_err(|err| {
            error!(error = %err, "catalog push commit failed");
        })?;

        info!(
            products_created = summary.products_created,
            products_updated = summary.products_updated,
            variations_processed = summary.variations_processed,
            store_products_processed = summary.store_products_processed,
            taxes_processed = summary.taxes_processed,
            "catalog push committed"
        );
        Ok(summary)
    }

    async fn apply(
        &self,
        tx: &mut dyn CatalogTx,
        payload: &CatalogPush,
    ) -> Result<PushSummary, SyncError> {
        let mut summary = PushSummary::default();
        let mut scope = upsert_reference_data(tx, payload, &mut summary).await?;

        let explicit: HashMap<&str, &StoreProductPayload> = payload
            .store_products
            .iter()
            .map(|sp| (sp.product_external_id.trim(), sp))
            .collect();

        let mut listed = Vec::with_capacity(payload.products.len());
        for product in &payload.products {
            let entry = explicit.get(product.external_id.trim()).copied();
            let product_id = self
                .reconcile_product(tx, &mut scope, product, entry, &mut summary)
                .await?;
            let (listing_id, listing_price) =
                upsert_listing(tx, scope.store_id, product_id, product, entry).await?;
            summary.store_products_processed += 1;
            listed.push(Listed {
                product,
                explicit: entry,
                listing_id,
                listing_price,
            });
        }

        let by_external: HashMap<&str, &Listed<'_>> = listed
            .iter()
            .map(|l| (l.product.external_id.trim(), l))
            .collect();
        for variation in &payload.variations {
            let Some(owner) = by_external.get(variation.product_external_id.trim()) else {
                return Err(SyncError::UnknownReference {
                    stage: SyncStage::Variation,
                    kind: "product",
                    reference: variation.product_external_id.clone(),
                });
            };
            let write = VariationWrite {
                store_listing_id: owner.listing_id,
                external_id: owned(variation.external_id.as_ref()),
                name: variation.name.trim().to_string(),
                display_name: owned(variation.display_name.as_ref()),
                price: variation
                    .price
                    .as_ref()
                    .map(|p| p.0.clone())
                    .unwrap_or_else(|| owner.listing_price.clone()),
                is_default: variation.is_default,
            };
            tx.upsert_variation(&write).await.at(SyncStage::Variation)?;
            summary.variations_processed += 1;
        }

        for item in &listed {
            link_taxes(tx, &mut scope, item).await?;
        }

        Ok(summary)
    }

    /// Matches the product against the catalog and writes it, returning its id.
    async fn reconcile_product(
        &self,
        tx: &mut dyn CatalogTx,
        scope: &mut StoreScope,
        product: &ProductPayload,
        explicit: Option<&StoreProductPayload>,
        summary: &mut PushSummary,
    ) -> Result<Id, SyncError> {
        let brand_id = resolve_brand(&mut *tx, product.brand.as_deref())
            .await
            .at(SyncStage::Product)?;
        let category_id = match trimmed(product.category_id.as_deref()) {
            Some(external) => resolve_category(tx, scope, external).await?,
            None => None,
        };

        let write = product_write(product, brand_id, category_id);
        let listing_external_id = listing_external_id(product, explicit);
        let query = MatchQuery {
            name: &write.name,
            barcode: write.barcode.as_deref(),
            sku: write.sku.as_deref(),
            ean: write.ean.as_deref(),
            store_id: Some(scope.store_id),
            external_id: Some(listing_external_id),
        };
        let matched = self
            .matcher
            .find_match(&mut *tx, &query)
            .await
            .at(SyncStage::Product)?;

        if let Some(found) = matched {
            tx.update_product(found.product_id, &write)
                .await
                .at(SyncStage::Product)?;
            summary.products_updated += 1;
            debug!(
                external_id = %product.external_id,
                product_id = found.product_id,
                match_type = found.match_type.as_str(),
                confidence = found.confidence,
                "product updated"
            );
            return Ok(found.product_id);
        }

        if let Some(id) = tx.insert_product(&write).await.at(SyncStage::Product)? {
            summary.products_created += 1;
            debug!(external_id = %product.external_id, product_id = id, "product created");
            return Ok(id);
        }

        // The barcode or EAN is held by an inactive product the matcher skipped,
        // or by a writer that committed after the matcher ran.
        let existing = tx
            .find_by_identifiers(write.barcode.as_deref(), write.ean.as_deref())
            .await
            .at(SyncStage::Product)?;
        let Some(id) = existing else {
            return Err(SyncError::Stage {
                stage: SyncStage::Product,
                source: StoreError::Contention(format!("product '{}'", product.external_id)),
            });
        };
        tx.update_product(id, &write).await.at(SyncStage::Product)?;
        summary.products_updated += 1;
        debug!(external_id = %product.external_id, product_id = id, "product insert lost an identifier race; updated winner");
        Ok(id)
    }
}

async fn upsert_reference_data(
    tx: &mut dyn CatalogTx,
    payload: &CatalogPush,
    summary: &mut PushSummary,
) -> Result<StoreScope, SyncError> {
    let details = &payload.store_details;
    let store = StoreRecord {
        external_id: details.id.trim().to_string(),
        name: details.name.trim().to_string(),
        address: owned(details.address.as_ref()),
        latitude: details.latitude.unwrap_or_default(),
        longitude: details.longitude.unwrap_or_default(),
    };
    let (store_id, outcome) = tx.upsert_store(&store).await.at(SyncStage::Store)?;
    debug!(store_id, created = outcome.is_created(), "store upserted");

    let mut scope = StoreScope {
        store_id,
        categories: HashMap::new(),
        taxes: HashMap::new(),
    };

    for category in &payload.categories {
        let record = CategoryRecord {
            external_id: category.id.trim().to_string(),
            name: category.name.trim().to_string(),
            parent_external_id: owned(category.parent_id.as_ref()),
        };
        let (id, _) = tx
            .upsert_category(store_id, &record)
            .await
            .at(SyncStage::Category)?;
        scope.categories.insert(record.external_id, id);
    }

    for tax in &payload.taxes {
        let record = TaxRecord {
            external_id: tax.id.trim().to_string(),
            name: tax.name.trim().to_string(),
            rate: tax.rate.0.clone(),
            is_inclusive: tax.is_inclusive,
        };
        let (id, _) = tx.upsert_tax(store_id, &record).await.at(SyncStage::Tax)?;
        scope.taxes.insert(record.external_id, id);
        summary.taxes_processed += 1;
    }

    Ok(scope)
}

/// Category referenced by a product: pushed alongside it, or already known
/// for this store. Unknown categories leave the product uncategorized.
async fn resolve_category(
    tx: &mut dyn CatalogTx,
    scope: &mut StoreScope,
    external_id: &str,
) -> Result<Option<Id>, SyncError> {
    if let Some(id) = scope.categories.get(external_id) {
        return Ok(Some(*id));
    }
    let found = tx
        .find_category(scope.store_id, external_id)
        .await
        .at(SyncStage::Product)?;
    match found {
        Some(id) => {
            scope.categories.insert(external_id.to_string(), id);
        }
        None => warn!(category = external_id, "product references unknown category"),
    }
    Ok(found)
}

fn listing_external_id<'a>(
    product: &'a ProductPayload,
    explicit: Option<&'a StoreProductPayload>,
) -> &'a str {
    explicit
        .and_then(|sp| trimmed(sp.external_id.as_deref()))
        .unwrap_or_else(|| product.external_id.trim())
}

fn product_write(product: &ProductPayload, brand_id: Option<Id>, category_id: Option<Id>) -> ProductWrite {
    let mut write = ProductWrite::new(product.name.trim());
    write.slug = owned(product.slug.as_ref()).or_else(|| {
        let slug = slugify(&write.name);
        (!slug.is_empty()).then_some(slug)
    });
    write.description = owned(product.description.as_ref());
    write.category_id = category_id;
    write.brand_id = brand_id;
    write.sku = owned(product.sku.as_ref());
    write.barcode = owned(product.barcode.as_ref());
    write.ean = owned(product.ean.as_ref());
    write.unit = owned(product.unit.as_ref());
    write.is_active = product.is_active;
    write.is_featured = product.is_featured;
    write.is_customizable = product.is_customizable;
    write.is_addon = product.is_addon;
    write.attributes = Value::Object(
        product
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<String, Value>>(),
    );
    write
}

async fn upsert_listing(
    tx: &mut dyn CatalogTx,
    store_id: Id,
    product_id: Id,
    product: &ProductPayload,
    explicit: Option<&StoreProductPayload>,
) -> Result<(Id, BigDecimal), SyncError> {
    let price = explicit
        .and_then(|sp| sp.price.as_ref())
        .or(product.price.as_ref())
        .map(|p| p.0.clone())
        .unwrap_or_else(|| BigDecimal::from(0));
    let listing = ListingWrite {
        store_id,
        product_id,
        external_id: listing_external_id(product, explicit).to_string(),
        price,
        currency: owned(product.currency.as_ref()),
        stock_quantity: explicit.and_then(|sp| sp.stock_quantity).unwrap_or(0),
        is_available: explicit.and_then(|sp| sp.is_available).unwrap_or(true),
    };
    let (id, _) = tx
        .upsert_listing(&listing)
        .await
        .at(SyncStage::StoreListing)?;
    Ok((id, listing.price))
}

/// Links the listing to the union of its product-level and listing-level taxes.
async fn link_taxes(
    tx: &mut dyn CatalogTx,
    scope: &mut StoreScope,
    item: &Listed<'_>,
) -> Result<(), SyncError> {
    let listing_level = item.explicit.map(|sp| sp.tax_ids.as_slice()).unwrap_or_default();
    let tax_ids: BTreeSet<&str> = item
        .product
        .tax_ids
        .iter()
        .chain(listing_level)
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();

    for external_id in tax_ids {
        let tax_id = match scope.taxes.get(external_id) {
            Some(id) => *id,
            None => {
                let found = tx
                    .find_tax(scope.store_id, external_id)
                    .await
                    .at(SyncStage::TaxLink)?;
                let Some(id) = found else {
                    return Err(SyncError::UnknownReference {
                        stage: SyncStage::TaxLink,
                        kind: "tax",
                        reference: external_id.to_string(),
                    });
                };
                scope.taxes.insert(external_id.to_string(), id);
                id
            }
        };
        let rate_override = item
            .explicit
            .and_then(|sp| sp.tax_rates.get(external_id))
            .map(|rate| rate.0.clone());
        tx.link_tax(&ListingTaxLink {
            store_listing_id: item.listing_id,
            tax_id,
            rate_override,
        })
        .await
        .at(SyncStage::TaxLink)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{NamedCandidate, NewBrand, SizedCandidate, UpsertOutcome};
    use crate::catalog::payload::{Amount, StoreDetails, TaxPayload, VariationPayload};
    use crate::database_ops::memory::MemoryCatalog;
    use crate::database_ops::store::{BrandRepository, ProductLookup};
    use async_trait::async_trait;
    use std::str::FromStr;

    fn push(products: Vec<ProductPayload>) -> CatalogPush {
        CatalogPush {
            store_details: StoreDetails {
                id: "store-1".into(),
                name: "Corner Shop".into(),
                address: None,
                latitude: Some(1.3),
                longitude: Some(103.8),
            },
            categories: Vec::new(),
            taxes: Vec::new(),
            products,
            variations: Vec::new(),
            store_products: Vec::new(),
        }
    }

    fn amount(raw: &str) -> Amount {
        Amount(BigDecimal::from_str(raw).unwrap())
    }

    fn reconciler(catalog: &MemoryCatalog) -> CatalogReconciler {
        CatalogReconciler::new(Arc::new(catalog.clone()), &SyncConfig::default())
    }

    #[tokio::test]
    async fn derived_listing_uses_product_defaults() {
        let catalog = MemoryCatalog::new();
        let mut milk = ProductPayload::new("p1", "Fresh Milk 1L");
        milk.price = Some(amount("3.20"));
        milk.currency = Some("SGD".into());

        let summary = reconciler(&catalog).push_catalog(&push(vec![milk])).await.unwrap();
        assert_eq!(summary.products_created, 1);
        assert_eq!(summary.store_products_processed, 1);

        let state = catalog.snapshot().await;
        let store_id = state.store_id("store-1").unwrap();
        let listing = &state.listing(store_id, "p1").unwrap().listing;
        assert_eq!(listing.price, BigDecimal::from_str("3.20").unwrap());
        assert_eq!(listing.stock_quantity, 0);
        assert!(listing.is_available);
        let product = state.product(listing.product_id).unwrap();
        assert_eq!(product.derived.volume_ml, Some(1000.0));
        assert_eq!(product.slug.as_deref(), Some("fresh-milk-1l"));
    }

    #[tokio::test]
    async fn variations_default_to_listing_price() {
        let catalog = MemoryCatalog::new();
        let mut coffee = ProductPayload::new("p1", "Latte");
        coffee.price = Some(amount("4.50"));
        let mut payload = push(vec![coffee]);
        payload.variations = vec![
            VariationPayload {
                external_id: None,
                product_external_id: "p1".into(),
                name: "Regular".into(),
                display_name: None,
                price: None,
                is_default: true,
            },
            VariationPayload {
                external_id: Some("v2".into()),
                product_external_id: "p1".into(),
                name: "Large".into(),
                display_name: Some("Large (16oz)".into()),
                price: Some(amount("5.50")),
                is_default: false,
            },
        ];

        let summary = reconciler(&catalog).push_catalog(&payload).await.unwrap();
        assert_eq!(summary.variations_processed, 2);

        let state = catalog.snapshot().await;
        let listing = state.listing(state.store_id("store-1").unwrap(), "p1").unwrap();
        let variations = state.variations_of(listing.id);
        assert_eq!(variations[0].price, BigDecimal::from_str("4.50").unwrap());
        assert_eq!(variations[1].price, BigDecimal::from_str("5.50").unwrap());
    }

    #[tokio::test]
    async fn tax_links_merge_levels_and_keep_overrides() {
        let catalog = MemoryCatalog::new();
        let mut soda = ProductPayload::new("p1", "Soda 330ml");
        soda.tax_ids = vec!["gst".into()];
        let mut payload = push(vec![soda]);
        payload.taxes = vec![
            TaxPayload {
                id: "gst".into(),
                name: "GST".into(),
                rate: amount("9"),
                is_inclusive: true,
            },
            TaxPayload {
                id: "sugar".into(),
                name: "Sugar levy".into(),
                rate: amount("2"),
                is_inclusive: false,
            },
        ];
        payload.store_products = vec![StoreProductPayload {
            product_external_id: "p1".into(),
            external_id: Some("erp-77".into()),
            price: Some(amount("1.80")),
            stock_quantity: Some(24),
            is_available: Some(false),
            tax_ids: vec!["sugar".into(), "gst".into()],
            tax_rates: [("sugar".to_string(), amount("1.5"))].into_iter().collect(),
        }];

        let summary = reconciler(&catalog).push_catalog(&payload).await.unwrap();
        assert_eq!(summary.taxes_processed, 2);

        let state = catalog.snapshot().await;
        let listing = state.listing(state.store_id("store-1").unwrap(), "erp-77").unwrap();
        assert_eq!(listing.listing.stock_quantity, 24);
        assert!(!listing.listing.is_available);
        let links = state.tax_links_of(listing.id);
        assert_eq!(links.len(), 2);
        let overridden: Vec<_> = links.iter().filter_map(|l| l.rate_override.clone()).collect();
        assert_eq!(overridden, vec![BigDecimal::from_str("1.5").unwrap()]);
    }

    #[tokio::test]
    async fn invalid_payload_never_opens_a_transaction() {
        let catalog = MemoryCatalog::new();
        catalog.fail_on("begin");
        let err = reconciler(&catalog).push_catalog(&push(Vec::new())).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    /// Store whose product inserts always lose a race to a writer that
    /// cannot be seen afterwards.
    struct VanishingWinner(MemoryCatalog);

    struct VanishingWinnerTx(Box<dyn CatalogTx>);

    #[async_trait]
    impl CatalogStore for VanishingWinner {
        async fn begin(&self) -> StoreResult<Box<dyn CatalogTx>> {
            Ok(Box::new(VanishingWinnerTx(self.0.begin().await?)))
        }
    }

    #[async_trait]
    impl BrandRepository for VanishingWinnerTx {
        async fn find_by_exact_name(&mut self, name: &str) -> StoreResult<Option<Id>> {
            self.0.find_by_exact_name(name).await
        }
        async fn find_by_normalized_name(&mut self, normalized: &str) -> StoreResult<Option<Id>> {
            self.0.find_by_normalized_name(normalized).await
        }
        async fn slug_exists(&mut self, slug: &str) -> StoreResult<bool> {
            self.0.slug_exists(slug).await
        }
        async fn insert(&mut self, brand: &NewBrand) -> StoreResult<Option<Id>> {
            self.0.insert(brand).await
        }
    }

    #[async_trait]
    impl ProductLookup for VanishingWinnerTx {
        async fn find_by_store_external_id(
            &mut self,
            store_id: Id,
            external_id: &str,
        ) -> StoreResult<Option<Id>> {
            self.0.find_by_store_external_id(store_id, external_id).await
        }
        async fn find_active_by_barcode(&mut self, barcode: &str) -> StoreResult<Option<Id>> {
            self.0.find_active_by_barcode(barcode).await
        }
        async fn find_active_by_ean(&mut self, ean: &str) -> StoreResult<Option<Id>> {
            self.0.find_active_by_ean(ean).await
        }
        async fn find_active_by_sku(&mut self, sku: &str) -> StoreResult<Option<Id>> {
            self.0.find_active_by_sku(sku).await
        }
        async fn find_active_by_name_key(
            &mut self,
            name_key: &str,
        ) -> StoreResult<Vec<SizedCandidate>> {
            self.0.find_active_by_name_key(name_key).await
        }
        async fn similarity_candidates(
            &mut self,
            name: &str,
            limit: i64,
        ) -> StoreResult<Vec<NamedCandidate>> {
            self.0.similarity_candidates(name, limit).await
        }
    }

    #[async_trait]
    impl CatalogTx for VanishingWinnerTx {
        async fn upsert_store(&mut self, store: &StoreRecord) -> StoreResult<(Id, UpsertOutcome)> {
            self.0.upsert_store(store).await
        }
        async fn find_store(&mut self, external_id: &str) -> StoreResult<Option<Id>> {
            self.0.find_store(external_id).await
        }
        async fn upsert_category(
            &mut self,
            store_id: Id,
            category: &CategoryRecord,
        ) -> StoreResult<(Id, UpsertOutcome)> {
            self.0.upsert_category(store_id, category).await
        }
        async fn upsert_tax(&mut self, store_id: Id, tax: &TaxRecord) -> StoreResult<(Id, UpsertOutcome)> {
            self.0.upsert_tax(store_id, tax).await
        }
        async fn find_category(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>> {
            self.0.find_category(store_id, external_id).await
        }
        async fn find_tax(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>> {
            self.0.find_tax(store_id, external_id).await
        }
        async fn find_by_identifiers(
            &mut self,
            _barcode: Option<&str>,
            _ean: Option<&str>,
        ) -> StoreResult<Option<Id>> {
            Ok(None)
        }
        async fn insert_product(&mut self, _product: &ProductWrite) -> StoreResult<Option<Id>> {
            Ok(None)
        }
        async fn update_product(&mut self, id: Id, product: &ProductWrite) -> StoreResult<()> {
            self.0.update_product(id, product).await
        }
        async fn upsert_listing(&mut self, listing: &ListingWrite) -> StoreResult<(Id, UpsertOutcome)> {
            self.0.upsert_listing(listing).await
        }
        async fn upsert_variation(
            &mut self,
            variation: &VariationWrite,
        ) -> StoreResult<(Id, UpsertOutcome)> {
            self.0.upsert_variation(variation).await
        }
        async fn link_tax(&mut self, link: &ListingTaxLink) -> StoreResult<()> {
            self.0.link_tax(link).await
        }
        async fn commit(self: Box<Self>) -> StoreResult<()> {
            self.0.commit().await
        }
    }

    #[tokio::test]
    async fn unresolvable_insert_race_reports_contention() {
        let catalog = MemoryCatalog::new();
        let sync = CatalogReconciler::new(
            Arc::new(VanishingWinner(catalog.clone())),
            &SyncConfig::default(),
        );
        let mut milk = ProductPayload::new("p1", "Fresh Milk 1L");
        milk.barcode = Some("888".into());

        let err = sync.push_catalog(&push(vec![milk])).await.unwrap_err();
        assert_eq!(err.stage(), Some(SyncStage::Product));
        assert!(matches!(
            err,
            SyncError::Stage {
                source: StoreError::Contention(_),
                ..
            }
        ));
        assert!(catalog.snapshot().await.stores.is_empty());
    }

    #[tokio::test]
    async fn extra_fields_become_attributes() {
        let catalog = MemoryCatalog::new();
        let mut rice = ProductPayload::new("p1", "Basmati Rice 5kg");
        rice.extra.insert("origin".into(), Value::String("IN".into()));
        reconciler(&catalog).push_catalog(&push(vec![rice])).await.unwrap();

        let state = catalog.snapshot().await;
        assert_eq!(state.products[0].product.attributes["origin"], "IN");
    }
}
