//! Postgres-backed catalog store.
//!
//! Each push runs in one transaction at READ COMMITTED. Uniqueness
//! constraints are the only mutual exclusion: inserts use
//! `ON CONFLICT DO NOTHING RETURNING id`, so losing a race yields no row
//! instead of aborting the transaction, and the caller re-reads the winner
//! (each statement sees rows committed before it started).

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};

use crate::catalog::models::{
    CategoryRecord, Id, ListingTaxLink, ListingWrite, NamedCandidate, NewBrand, ProductWrite,
    SizedCandidate, StoreRecord, TaxRecord, UpsertOutcome, VariationWrite,
};
use crate::config::SyncConfig;
use crate::database_ops::db::Db;
use crate::database_ops::store::{
    BrandRepository, CatalogStore, CatalogTx, ProductLookup, StoreResult,
};
use crate::normalization::SimilarityKind;

/// Fuzzy candidates: the `limit` rows most trigram-similar to `$1`, in id order.
/// The `%` operator (index-backed, cut at `pg_trgm.similarity_threshold`)
/// narrows the scan when the matcher itself scores with trigrams.
const TRIGRAM_CANDIDATES_SQL: &str = "SELECT id, name FROM (
         SELECT id, name FROM products
         WHERE is_active AND name % $1
         ORDER BY similarity(name, $1) DESC, id
         LIMIT $2
     ) top
     ORDER BY id";

/// Same ranking without the `%` cut, so other scorers also see names that
/// pg_trgm rates below its threshold.
const RANKED_CANDIDATES_SQL: &str = "SELECT id, name FROM (
         SELECT id, name FROM products
         WHERE is_active
         ORDER BY similarity(name, $1) DESC, id
         LIMIT $2
     ) top
     ORDER BY id";

fn candidates_sql(similarity: SimilarityKind) -> &'static str {
    match similarity {
        SimilarityKind::Trigram => TRIGRAM_CANDIDATES_SQL,
        SimilarityKind::JaroWinkler => RANKED_CANDIDATES_SQL,
    }
}

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
    statement_timeout: Duration,
    candidates_sql: &'static str,
}

impl PgCatalogStore {
    pub fn new(db: &Db, config: &SyncConfig) -> Self {
        Self {
            pool: db.pool.clone(),
            statement_timeout: config.statement_timeout,
            candidates_sql: candidates_sql(config.similarity),
        }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTx>> {
        let mut tx = self.pool.begin().await?;
        // SET LOCAL takes no bind parameters; the value is an integer we format ourselves.
        let timeout_ms = self.statement_timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .persistent(false)
            .execute(&mut *tx)
            .await?;
        debug!(timeout_ms = timeout_ms as u64, "catalog transaction opened");
        Ok(Box::new(PgCatalogTx {
            tx,
            candidates_sql: self.candidates_sql,
        }))
    }
}

/// Open catalog transaction. Dropping it without [`CatalogTx::commit`] rolls back.
pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
    candidates_sql: &'static str,
}

fn id_of(row: Option<PgRow>) -> StoreResult<Option<Id>> {
    Ok(row.map(|r| r.try_get::<i64, _>("id")).transpose()?)
}

/// Reads `id` and the `inserted` flag returned by an upsert.
fn upserted(row: PgRow) -> StoreResult<(Id, UpsertOutcome)> {
    let id: i64 = row.try_get("id")?;
    let inserted: bool = row.try_get("inserted")?;
    let outcome = if inserted {
        UpsertOutcome::Created
    } else {
        UpsertOutcome::Updated
    };
    Ok((id, outcome))
}

impl PgCatalogTx {
    async fn single_id(&mut self, sql: &str, value: &str) -> StoreResult<Option<Id>> {
        let row = sqlx::query(sql)
            .persistent(false)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        id_of(row)
    }
}

#[async_trait]
impl BrandRepository for PgCatalogTx {
    async fn find_by_exact_name(&mut self, name: &str) -> StoreResult<Option<Id>> {
        self.single_id("SELECT id FROM brands WHERE name = $1", name)
            .await
    }

    async fn find_by_normalized_name(&mut self, normalized: &str) -> StoreResult<Option<Id>> {
        self.single_id(
            "SELECT id FROM brands WHERE normalized_name = $1 ORDER BY id LIMIT 1",
            normalized,
        )
        .await
    }

    async fn slug_exists(&mut self, slug: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM brands WHERE slug = $1) AS taken")
            .persistent(false)
            .bind(slug)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.try_get("taken")?)
    }

    async fn insert(&mut self, brand: &NewBrand) -> StoreResult<Option<Id>> {
        let row = sqlx::query(
            "INSERT INTO brands (name, normalized_name, slug) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING
             RETURNING id",
        )
        .persistent(false)
        .bind(&brand.name)
        .bind(&brand.normalized_name)
        .bind(&brand.slug)
        .fetch_optional(&mut *self.tx)
        .await?;
        id_of(row)
    }
}

#[async_trait]
impl ProductLookup for PgCatalogTx {
    async fn find_by_store_external_id(
        &mut self,
        store_id: Id,
        external_id: &str,
    ) -> StoreResult<Option<Id>> {
        let row = sqlx::query(
            "SELECT product_id AS id FROM store_products WHERE store_id = $1 AND external_id = $2",
        )
        .persistent(false)
        .bind(store_id)
        .bind(external_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        id_of(row)
    }

    async fn find_active_by_barcode(&mut self, barcode: &str) -> StoreResult<Option<Id>> {
        self.single_id(
            "SELECT id FROM products WHERE barcode = $1 AND is_active ORDER BY id LIMIT 1",
            barcode,
        )
        .await
    }

    async fn find_active_by_ean(&mut self, ean: &str) -> StoreResult<Option<Id>> {
        self.single_id(
            "SELECT id FROM products WHERE ean = $1 AND is_active ORDER BY id LIMIT 1",
            ean,
        )
        .await
    }

    async fn find_active_by_sku(&mut self, sku: &str) -> StoreResult<Option<Id>> {
        self.single_id(
            "SELECT id FROM products WHERE sku = $1 AND is_active ORDER BY id LIMIT 1",
            sku,
        )
        .await
    }

    async fn find_active_by_name_key(
        &mut self,
        name_key: &str,
    ) -> StoreResult<Vec<SizedCandidate>> {
        let rows = sqlx::query(
            "SELECT id, volume_ml, weight_g FROM products
             WHERE name_key = $1 AND is_active
             ORDER BY id",
        )
        .persistent(false)
        .bind(name_key)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter()
            .map(|r| -> StoreResult<SizedCandidate> {
                Ok(SizedCandidate {
                    id: r.try_get("id")?,
                    volume_ml: r.try_get("volume_ml")?,
                    weight_g: r.try_get("weight_g")?,
                })
            })
            .collect()
    }

    async fn similarity_candidates(
        &mut self,
        name: &str,
        limit: i64,
    ) -> StoreResult<Vec<NamedCandidate>> {
        let rows = sqlx::query(self.candidates_sql)
            .persistent(false)
            .bind(name)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter()
            .map(|r| -> StoreResult<NamedCandidate> {
                Ok(NamedCandidate {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn upsert_store(&mut self, store: &StoreRecord) -> StoreResult<(Id, UpsertOutcome)> {
        let row = sqlx::query(
            "INSERT INTO stores (external_id, name, address, latitude, longitude)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (external_id) DO UPDATE SET
                 name = EXCLUDED.name,
                 address = EXCLUDED.address,
                 latitude = EXCLUDED.latitude,
                 longitude = EXCLUDED.longitude,
                 updated_at = now()
             RETURNING id, (xmax = 0) AS inserted",
        )
        .persistent(false)
        .bind(&store.external_id)
        .bind(&store.name)
        .bind(&store.address)
        .bind(store.latitude)
        .bind(store.longitude)
        .fetch_one(&mut *self.tx)
        .await?;
        upserted(row)
    }

    async fn find_store(&mut self, external_id: &str) -> StoreResult<Option<Id>> {
        self.single_id("SELECT id FROM stores WHERE external_id = $1", external_id)
            .await
    }

    async fn upsert_category(
        &mut self,
        store_id: Id,
        category: &CategoryRecord,
    ) -> StoreResult<(Id, UpsertOutcome)> {
        let row = sqlx::query(
            "INSERT INTO categories (store_id, external_id, name, parent_external_id)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (store_id, external_id) DO UPDATE SET
                 name = EXCLUDED.name,
                 parent_external_id = EXCLUDED.parent_external_id,
                 updated_at = now()
             RETURNING id, (xmax = 0) AS inserted",
        )
        .persistent(false)
        .bind(store_id)
        .bind(&category.external_id)
        .bind(&category.name)
        .bind(&category.parent_external_id)
        .fetch_one(&mut *self.tx)
        .await?;
        upserted(row)
    }

    async fn upsert_tax(&mut self, store_id: Id, tax: &TaxRecord) -> StoreResult<(Id, UpsertOutcome)> {
        let row = sqlx::query(
            "INSERT INTO taxes (store_id, external_id, name, rate, is_inclusive)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (store_id, external_id) DO UPDATE SET
                 name = EXCLUDED.name,
                 rate = EXCLUDED.rate,
                 is_inclusive = EXCLUDED.is_inclusive,
                 updated_at = now()
             RETURNING id, (xmax = 0) AS inserted",
        )
        .persistent(false)
        .bind(store_id)
        .bind(&tax.external_id)
        .bind(&tax.name)
        .bind(&tax.rate)
        .bind(tax.is_inclusive)
        .fetch_one(&mut *self.tx)
        .await?;
        upserted(row)
    }

    async fn find_category(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>> {
        let row = sqlx::query("SELECT id FROM categories WHERE store_id = $1 AND external_id = $2")
            .persistent(false)
            .bind(store_id)
            .bind(external_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        id_of(row)
    }

    async fn find_tax(&mut self, store_id: Id, external_id: &str) -> StoreResult<Option<Id>> {
        let row = sqlx::query("SELECT id FROM taxes WHERE store_id = $1 AND external_id = $2")
            .persistent(false)
            .bind(store_id)
            .bind(external_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        id_of(row)
    }

    async fn find_by_identifiers(
        &mut self,
        barcode: Option<&str>,
        ean: Option<&str>,
    ) -> StoreResult<Option<Id>> {
        let row = sqlx::query(
            "SELECT id FROM products
             WHERE ($1::text IS NOT NULL AND barcode = $1)
                OR ($2::text IS NOT NULL AND ean = $2)
             ORDER BY id LIMIT 1",
        )
        .persistent(false)
        .bind(barcode)
        .bind(ean)
        .fetch_optional(&mut *self.tx)
        .await?;
        id_of(row)
    }

    async fn insert_product(&mut self, product: &ProductWrite) -> StoreResult<Option<Id>> {
        let row = sqlx::query(
            "INSERT INTO products (
                 name, normalized_name, name_key, volume_ml, weight_g, slug, description,
                 category_id, brand_id, sku, barcode, ean, unit,
                 is_active, is_featured, is_customizable, is_addon, attributes
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             ON CONFLICT DO NOTHING
             RETURNING id",
        )
        .persistent(false)
        .bind(&product.name)
        .bind(&product.derived.normalized_name)
        .bind(&product.derived.name_key)
        .bind(product.derived.volume_ml)
        .bind(product.derived.weight_g)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.category_id)
        .bind(product.brand_id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.ean)
        .bind(&product.unit)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.is_customizable)
        .bind(product.is_addon)
        .bind(&product.attributes)
        .fetch_optional(&mut *self.tx)
        .await?;
        id_of(row)
    }

    /// Last write wins on every descriptive column. Identifiers stay as first
    /// recorded, and an unresolved brand keeps the current one.
    async fn update_product(&mut self, id: Id, product: &ProductWrite) -> StoreResult<()> {
        sqlx::query(
            "UPDATE products SET
                 name = $2,
                 normalized_name = $3,
                 name_key = $4,
                 volume_ml = $5,
                 weight_g = $6,
                 slug = $7,
                 description = $8,
                 category_id = $9,
                 brand_id = COALESCE($10, brand_id),
                 unit = $11,
                 is_active = $12,
                 is_featured = $13,
                 is_customizable = $14,
                 is_addon = $15,
                 attributes = $16,
                 updated_at = now()
             WHERE id = $1",
        )
        .persistent(false)
        .bind(id)
        .bind(&product.name)
        .bind(&product.derived.normalized_name)
        .bind(&product.derived.name_key)
        .bind(product.derived.volume_ml)
        .bind(product.derived.weight_g)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.category_id)
        .bind(product.brand_id)
        .bind(&product.unit)
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.is_customizable)
        .bind(product.is_addon)
        .bind(&product.attributes)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_listing(&mut self, listing: &ListingWrite) -> StoreResult<(Id, UpsertOutcome)> {
        let row = sqlx::query(
            "INSERT INTO store_products
                 (store_id, product_id, external_id, price, currency, stock_quantity, is_available)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (store_id, external_id) DO UPDATE SET
                 product_id = EXCLUDED.product_id,
                 price = EXCLUDED.price,
                 currency = EXCLUDED.currency,
                 stock_quantity = EXCLUDED.stock_quantity,
                 is_available = EXCLUDED.is_available,
                 updated_at = now()
             RETURNING id, (xmax = 0) AS inserted",
        )
        .persistent(false)
        .bind(listing.store_id)
        .bind(listing.product_id)
        .bind(&listing.external_id)
        .bind(&listing.price)
        .bind(&listing.currency)
        .bind(listing.stock_quantity)
        .bind(listing.is_available)
        .fetch_one(&mut *self.tx)
        .await?;
        upserted(row)
    }

    async fn upsert_variation(
        &mut self,
        variation: &VariationWrite,
    ) -> StoreResult<(Id, UpsertOutcome)> {
        let row = sqlx::query(
            "INSERT INTO variations
                 (store_product_id, external_id, name, display_name, price, is_default)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (store_product_id, name) DO UPDATE SET
                 external_id = EXCLUDED.external_id,
                 display_name = EXCLUDED.display_name,
                 price = EXCLUDED.price,
                 is_default = EXCLUDED.is_default,
                 updated_at = now()
             RETURNING id, (xmax = 0) AS inserted",
        )
        .persistent(false)
        .bind(variation.store_listing_id)
        .bind(&variation.external_id)
        .bind(&variation.name)
        .bind(&variation.display_name)
        .bind(&variation.price)
        .bind(variation.is_default)
        .fetch_one(&mut *self.tx)
        .await?;
        upserted(row)
    }

    async fn link_tax(&mut self, link: &ListingTaxLink) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO store_product_taxes (store_product_id, tax_id, rate_override)
             VALUES ($1, $2, $3)
             ON CONFLICT (store_product_id, tax_id) DO UPDATE SET
                 rate_override = EXCLUDED.rate_override",
        )
        .persistent(false)
        .bind(link.store_listing_id)
        .bind(link.tax_id)
        .bind(&link.rate_override)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        debug!("catalog transaction committed");
        Ok(())
    }
}
