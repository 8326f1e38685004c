//! Repository interfaces over the catalog store.
//!
//! The matcher and brand resolver only see the narrow lookup traits, so they
//! run unchanged against Postgres or the in-memory catalog. Writes happen
//! through a [`CatalogTx`]: one unit of work per push, published by
//! [`CatalogTx::commit`] and discarded if dropped before that.

use async_trait::async_trait;

use crate::catalog::models::{
    CategoryRecord, Id, ListingTaxLink, ListingWrite, NamedCandidate, NewBrand, ProductWrite,
    SizedCandidate, StoreRecord, TaxRecord, UpsertOutcome, VariationWrite,
};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BrandRepository: Send {
    async fn find_by_exact_name(&mut self, name: &str) -> StoreResult<Option<Id>>;

    async fn find_by_normalized_name(&mut self, normalized: &str) -> StoreResult<Option<Id>>;

    async fn slug_exists(&mut self, slug: &str) -> StoreResult<bool>;

    /// Inserts the brand, or returns `None` if a name or slug uniqueness
    /// constraint rejected it (another writer got there first).
    async fn insert(&mut self, brand: &NewBrand) -> StoreResult<Option<Id>>;
}

/// Read-only queries backing the product matcher. Every `Vec` result is
/// ordered by ascending product id.
#[async_trait]
pub trait ProductLookup: Send {
    /// Product behind the listing keyed by (store, external id), if any.
    /// The product's active flag is not checked, so a re-push of a known
    /// listing always lands on the product it already points at.
    async fn find_by_store_external_id(
        &mut self,
        store_id: Id,
        external_id: &str,
    ) -> StoreResult<Option<Id>>;

    async fn find_active_by_barcode(&mut self, barcode: &str) -> StoreResult<Option<Id>>;

    async fn find_active_by_ean(&mut self, ean: &str) -> StoreResult<Option<Id>>;

    async fn find_active_by_sku(&mut self, sku: &str) -> StoreResult<Option<Id>>;

    async fn find_active_by_name_key(&mut self, name_key: &str) -> StoreResult<Vec<SizedCandidate>>;

    /// Active products worth scoring against `name`; stores may prefilter,
    /// but must return at most `limit` rows.
    async fn similarity_candidates(
        &mut self,
        name: &str,
        limit: i64,
    ) -> StoreResult<Vec<NamedCandidate>>;
}

/// One push's unit of work against the catalog.
#[async_trait]
pub trait CatalogTx: BrandRepository + ProductLookup {
    async fn upsert_store(&mut self, store: &StoreRecord) -> StoreResult<(Id, UpsertOutcome)>;

    async fn find_store(&mut self, external_id: &str) -> StoreResult<Option<Id>>;

    async fn upsert_category(
        &mut self,
        store_id: Id,
        category: &CategoryRecord,
    ) -> StoreResult<(Id, UpsertOutcome)>;

    async fn upsert_tax(&mut self, store_id: Id, tax: &TaxRecord) -> StoreResult<(Id, UpsertOutcome)>;

    async fn find_category(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>>;

    async fn find_tax(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>>;

    /// Product carrying this barcode or EAN regardless of its active flag.
    async fn find_by_identifiers(
        &mut self,
        barcode: Option<&str>,
        ean: Option<&str>,
    ) -> StoreResult<Option<Id>>;

    /// Inserts a product, or returns `None` when a barcode/EAN uniqueness
    /// constraint rejected it.
    async fn insert_product(&mut self, product: &ProductWrite) -> StoreResult<Option<Id>>;

    /// Overwrites the mutable fields of an existing product.
    async fn update_product(&mut self, id: Id, product: &ProductWrite) -> StoreResult<()>;

    async fn upsert_listing(&mut self, listing: &ListingWrite) -> StoreResult<(Id, UpsertOutcome)>;

    async fn upsert_variation(
        &mut self,
        variation: &VariationWrite,
    ) -> StoreResult<(Id, UpsertOutcome)>;

    async fn link_tax(&mut self, link: &ListingTaxLink) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Source of catalog transactions.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTx>>;
}
