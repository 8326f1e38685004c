//! In-process catalog store.
//!
//! Backs tests and `--dry-run` pushes. A transaction holds the catalog lock
//! for its whole lifetime and works on a private copy of the state, which is
//! written back only on commit; dropping the transaction discards the copy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::catalog::models::{
    CategoryRecord, Id, ListingTaxLink, ListingWrite, NamedCandidate, NewBrand, ProductWrite,
    SizedCandidate, StoreRecord, TaxRecord, UpsertOutcome, VariationWrite,
};
use crate::database_ops::store::{
    BrandRepository, CatalogStore, CatalogTx, ProductLookup, StoreResult,
};
use crate::error::StoreError;
use crate::normalization::similarity::{SimilarityScorer, TrigramSimilarity};

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRow {
    pub id: Id,
    pub record: StoreRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub id: Id,
    pub store_id: Id,
    pub record: CategoryRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxRow {
    pub id: Id,
    pub store_id: Id,
    pub record: TaxRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrandRow {
    pub id: Id,
    pub brand: NewBrand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub id: Id,
    pub product: ProductWrite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub id: Id,
    pub listing: ListingWrite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariationRow {
    pub id: Id,
    pub variation: VariationWrite,
}

/// Committed catalog contents. Rows are kept in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogState {
    next_id: Id,
    pub stores: Vec<StoreRow>,
    pub categories: Vec<CategoryRow>,
    pub taxes: Vec<TaxRow>,
    pub brands: Vec<BrandRow>,
    pub products: Vec<ProductRow>,
    pub listings: Vec<ListingRow>,
    pub variations: Vec<VariationRow>,
    pub tax_links: Vec<ListingTaxLink>,
}

impl CatalogState {
    fn allocate(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    pub fn store_id(&self, external_id: &str) -> Option<Id> {
        self.stores
            .iter()
            .find(|s| s.record.external_id == external_id)
            .map(|s| s.id)
    }

    pub fn product(&self, id: Id) -> Option<&ProductWrite> {
        self.products.iter().find(|p| p.id == id).map(|p| &p.product)
    }

    pub fn listing(&self, store_id: Id, external_id: &str) -> Option<&ListingRow> {
        self.listings
            .iter()
            .find(|l| l.listing.store_id == store_id && l.listing.external_id == external_id)
    }

    pub fn variations_of(&self, store_listing_id: Id) -> Vec<&VariationWrite> {
        self.variations
            .iter()
            .filter(|v| v.variation.store_listing_id == store_listing_id)
            .map(|v| &v.variation)
            .collect()
    }

    pub fn tax_links_of(&self, store_listing_id: Id) -> Vec<&ListingTaxLink> {
        self.tax_links
            .iter()
            .filter(|l| l.store_listing_id == store_listing_id)
            .collect()
    }

    fn active_products(&self) -> impl Iterator<Item = &ProductRow> {
        self.products.iter().filter(|p| p.product.is_active)
    }
}

/// Shared in-memory catalog. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<AsyncMutex<CatalogState>>,
    faults: Arc<Mutex<HashSet<String>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> CatalogState {
        self.state.lock().await.clone()
    }

    /// Makes every later call of the named operation (e.g. `"upsert_variation"`)
    /// fail with [`StoreError::Unavailable`].
    pub fn fail_on(&self, operation: &str) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(operation.to_string());
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let tx = MemoryTx {
            faults: Arc::clone(&self.faults),
            work: (*guard).clone(),
            guard,
        };
        tx.check("begin")?;
        Ok(Box::new(tx))
    }
}

struct MemoryTx {
    faults: Arc<Mutex<HashSet<String>>>,
    guard: OwnedMutexGuard<CatalogState>,
    work: CatalogState,
}

impl MemoryTx {
    fn check(&self, operation: &str) -> StoreResult<()> {
        let injected = self
            .faults
            .lock()
            .map(|faults| faults.contains(operation))
            .unwrap_or(false);
        if injected {
            return Err(StoreError::Unavailable(format!("injected failure in {operation}")));
        }
        Ok(())
    }
}

fn same(value: &Option<String>, wanted: &str) -> bool {
    value.as_deref() == Some(wanted)
}

#[async_trait]
impl BrandRepository for MemoryTx {
    async fn find_by_exact_name(&mut self, name: &str) -> StoreResult<Option<Id>> {
        self.check("find_brand")?;
        Ok(self
            .work
            .brands
            .iter()
            .find(|b| b.brand.name == name)
            .map(|b| b.id))
    }

    async fn find_by_normalized_name(&mut self, normalized: &str) -> StoreResult<Option<Id>> {
        self.check("find_brand")?;
        Ok(self
            .work
            .brands
            .iter()
            .find(|b| b.brand.normalized_name == normalized)
            .map(|b| b.id))
    }

    async fn slug_exists(&mut self, slug: &str) -> StoreResult<bool> {
        Ok(self.work.brands.iter().any(|b| b.brand.slug == slug))
    }

    async fn insert(&mut self, brand: &NewBrand) -> StoreResult<Option<Id>> {
        self.check("insert_brand")?;
        let conflict = self.work.brands.iter().any(|b| {
            b.brand.name == brand.name
                || b.brand.slug == brand.slug
                || b.brand.normalized_name == brand.normalized_name
        });
        if conflict {
            return Ok(None);
        }
        let id = self.work.allocate();
        self.work.brands.push(BrandRow {
            id,
            brand: brand.clone(),
        });
        Ok(Some(id))
    }
}

#[async_trait]
impl ProductLookup for MemoryTx {
    async fn find_by_store_external_id(
        &mut self,
        store_id: Id,
        external_id: &str,
    ) -> StoreResult<Option<Id>> {
        self.check("find_product")?;
        Ok(self
            .work
            .listing(store_id, external_id)
            .map(|l| l.listing.product_id))
    }

    async fn find_active_by_barcode(&mut self, barcode: &str) -> StoreResult<Option<Id>> {
        self.check("find_product")?;
        Ok(self
            .work
            .active_products()
            .find(|p| same(&p.product.barcode, barcode))
            .map(|p| p.id))
    }

    async fn find_active_by_ean(&mut self, ean: &str) -> StoreResult<Option<Id>> {
        self.check("find_product")?;
        Ok(self
            .work
            .active_products()
            .find(|p| same(&p.product.ean, ean))
            .map(|p| p.id))
    }

    async fn find_active_by_sku(&mut self, sku: &str) -> StoreResult<Option<Id>> {
        self.check("find_product")?;
        Ok(self
            .work
            .active_products()
            .find(|p| same(&p.product.sku, sku))
            .map(|p| p.id))
    }

    async fn find_active_by_name_key(
        &mut self,
        name_key: &str,
    ) -> StoreResult<Vec<SizedCandidate>> {
        self.check("find_product")?;
        Ok(self
            .work
            .active_products()
            .filter(|p| p.product.derived.name_key == name_key)
            .map(|p| SizedCandidate {
                id: p.id,
                volume_ml: p.product.derived.volume_ml,
                weight_g: p.product.derived.weight_g,
            })
            .collect())
    }

    /// Keeps the `limit` active products most trigram-similar to `name`
    /// (lowest id first among equal scores), returned in id order.
    async fn similarity_candidates(
        &mut self,
        name: &str,
        limit: i64,
    ) -> StoreResult<Vec<NamedCandidate>> {
        self.check("find_product")?;
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut ranked: Vec<(f64, &ProductRow)> = self
            .work
            .active_products()
            .map(|p| (TrigramSimilarity.score(name, &p.product.name), p))
            .collect();
        ranked.sort_by(|(a, pa), (b, pb)| b.total_cmp(a).then(pa.id.cmp(&pb.id)));
        ranked.truncate(limit);
        ranked.sort_by_key(|(_, p)| p.id);
        Ok(ranked
            .into_iter()
            .map(|(_, p)| NamedCandidate {
                id: p.id,
                name: p.product.name.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl CatalogTx for MemoryTx {
    async fn upsert_store(&mut self, store: &StoreRecord) -> StoreResult<(Id, UpsertOutcome)> {
        self.check("upsert_store")?;
        if let Some(row) = self
            .work
            .stores
            .iter_mut()
            .find(|s| s.record.external_id == store.external_id)
        {
            row.record = store.clone();
            return Ok((row.id, UpsertOutcome::Updated));
        }
        let id = self.work.allocate();
        self.work.stores.push(StoreRow {
            id,
            record: store.clone(),
        });
        Ok((id, UpsertOutcome::Created))
    }

    async fn find_store(&mut self, external_id: &str) -> StoreResult<Option<Id>> {
        Ok(self.work.store_id(external_id))
    }

    async fn upsert_category(
        &mut self,
        store_id: Id,
        category: &CategoryRecord,
    ) -> StoreResult<(Id, UpsertOutcome)> {
        self.check("upsert_category")?;
        if let Some(row) = self
            .work
            .categories
            .iter_mut()
            .find(|c| c.store_id == store_id && c.record.external_id == category.external_id)
        {
            row.record = category.clone();
            return Ok((row.id, UpsertOutcome::Updated));
        }
        let id = self.work.allocate();
        self.work.categories.push(CategoryRow {
            id,
            store_id,
            record: category.clone(),
        });
        Ok((id, UpsertOutcome::Created))
    }

    async fn upsert_tax(&mut self, store_id: Id, tax: &TaxRecord) -> StoreResult<(Id, UpsertOutcome)> {
        self.check("upsert_tax")?;
        if let Some(row) = self
            .work
            .taxes
            .iter_mut()
            .find(|t| t.store_id == store_id && t.record.external_id == tax.external_id)
        {
            row.record = tax.clone();
            return Ok((row.id, UpsertOutcome::Updated));
        }
        let id = self.work.allocate();
        self.work.taxes.push(TaxRow {
            id,
            store_id,
            record: tax.clone(),
        });
        Ok((id, UpsertOutcome::Created))
    }

    async fn find_category(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>> {
        Ok(self
            .work
            .categories
            .iter()
            .find(|c| c.store_id == store_id && c.record.external_id == external_id)
            .map(|c| c.id))
    }

    async fn find_tax(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>> {
        Ok(self
            .work
            .taxes
            .iter()
            .find(|t| t.store_id == store_id && t.record.external_id == external_id)
            .map(|t| t.id))
    }

    async fn find_by_identifiers(
        &mut self,
        barcode: Option<&str>,
        ean: Option<&str>,
    ) -> StoreResult<Option<Id>> {
        self.check("find_product")?;
        Ok(self
            .work
            .products
            .iter()
            .find(|p| {
                barcode.is_some_and(|b| same(&p.product.barcode, b))
                    || ean.is_some_and(|e| same(&p.product.ean, e))
            })
            .map(|p| p.id))
    }

    async fn insert_product(&mut self, product: &ProductWrite) -> StoreResult<Option<Id>> {
        self.check("insert_product")?;
        let conflict = self.work.products.iter().any(|p| {
            product
                .barcode
                .as_deref()
                .is_some_and(|b| same(&p.product.barcode, b))
                || product.ean.as_deref().is_some_and(|e| same(&p.product.ean, e))
        });
        if conflict {
            return Ok(None);
        }
        let id = self.work.allocate();
        self.work.products.push(ProductRow {
            id,
            product: product.clone(),
        });
        Ok(Some(id))
    }

    async fn update_product(&mut self, id: Id, product: &ProductWrite) -> StoreResult<()> {
        self.check("update_product")?;
        let row = self
            .work
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::Unavailable(format!("product {id} vanished")))?;
        let existing = &mut row.product;
        existing.name = product.name.clone();
        existing.derived = product.derived.clone();
        existing.slug = product.slug.clone();
        existing.description = product.description.clone();
        existing.category_id = product.category_id;
        if product.brand_id.is_some() {
            existing.brand_id = product.brand_id;
        }
        existing.unit = product.unit.clone();
        existing.is_active = product.is_active;
        existing.is_featured = product.is_featured;
        existing.is_customizable = product.is_customizable;
        existing.is_addon = product.is_addon;
        existing.attributes = product.attributes.clone();
        Ok(())
    }

    async fn upsert_listing(&mut self, listing: &ListingWrite) -> StoreResult<(Id, UpsertOutcome)> {
        self.check("upsert_listing")?;
        if let Some(row) = self.work.listings.iter_mut().find(|l| {
            l.listing.store_id == listing.store_id && l.listing.external_id == listing.external_id
        }) {
            row.listing = listing.clone();
            return Ok((row.id, UpsertOutcome::Updated));
        }
        let id = self.work.allocate();
        self.work.listings.push(ListingRow {
            id,
            listing: listing.clone(),
        });
        Ok((id, UpsertOutcome::Created))
    }

    async fn upsert_variation(
        &mut self,
        variation: &VariationWrite,
    ) -> StoreResult<(Id, UpsertOutcome)> {
        self.check("upsert_variation")?;
        if let Some(row) = self.work.variations.iter_mut().find(|v| {
            v.variation.store_listing_id == variation.store_listing_id
                && v.variation.name == variation.name
        }) {
            row.variation = variation.clone();
            return Ok((row.id, UpsertOutcome::Updated));
        }
        let id = self.work.allocate();
        self.work.variations.push(VariationRow {
            id,
            variation: variation.clone(),
        });
        Ok((id, UpsertOutcome::Created))
    }

    async fn link_tax(&mut self, link: &ListingTaxLink) -> StoreResult<()> {
        self.check("link_tax")?;
        match self
            .work
            .tax_links
            .iter_mut()
            .find(|l| l.store_listing_id == link.store_listing_id && l.tax_id == link.tax_id)
        {
            Some(existing) => existing.rate_override = link.rate_override.clone(),
            None => self.work.tax_links.push(link.clone()),
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.check("commit")?;
        let MemoryTx {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }
}
