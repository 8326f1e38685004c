use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::catalog::models::Id;
use crate::config::SyncConfig;
use crate::database_ops::store::{ProductLookup, StoreResult};
use crate::normalization::{extract_volume_ml, extract_weight_g, name_key, SimilarityScorer};

/// Which layer produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExistingExternalId,
    Barcode,
    Ean,
    Sku,
    NormalizedNameVolume,
    NormalizedNameWeight,
    Fuzzy,
    None,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExistingExternalId => "existing_external_id",
            Self::Barcode => "barcode",
            Self::Ean => "ean",
            Self::Sku => "sku",
            Self::NormalizedNameVolume => "normalized_name_volume",
            Self::NormalizedNameWeight => "normalized_name_weight",
            Self::Fuzzy => "fuzzy",
            Self::None => "none",
        }
    }
}

/// Identifiers of an incoming item.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchQuery<'a> {
    pub name: &'a str,
    pub barcode: Option<&'a str>,
    pub sku: Option<&'a str>,
    pub ean: Option<&'a str>,
    pub store_id: Option<Id>,
    pub external_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMatch {
    pub product_id: Id,
    pub match_type: MatchType,
    /// 0-100.
    pub confidence: u8,
}

impl ProductMatch {
    fn new(product_id: Id, match_type: MatchType, confidence: u8) -> Self {
        Self {
            product_id,
            match_type,
            confidence,
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Layered product matcher. Layers run in a fixed order and the first one
/// that yields a product wins:
///
/// 0. listing already mapped for (store, external id): 100
/// 1. barcode: 100
/// 2. EAN: 100
/// 3. SKU: 98
/// 4. name key + volume within tolerance: 95
/// 5. name key + weight within tolerance: 95
/// 6. best similarity score above the fuzzy threshold: score x 100
pub struct ProductMatcher {
    scorer: Box<dyn SimilarityScorer>,
    fuzzy_threshold: f64,
    size_tolerance: f64,
    candidate_limit: i64,
}

impl ProductMatcher {
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_scorer(config, config.similarity.scorer())
    }

    pub fn with_scorer(config: &SyncConfig, scorer: Box<dyn SimilarityScorer>) -> Self {
        Self {
            scorer,
            fuzzy_threshold: config.fuzzy_threshold,
            size_tolerance: config.size_tolerance,
            candidate_limit: config.candidate_limit,
        }
    }

    #[instrument(skip(self, repo, query), fields(name = query.name))]
    pub async fn find_match<R>(
        &self,
        repo: &mut R,
        query: &MatchQuery<'_>,
    ) -> StoreResult<Option<ProductMatch>>
    where
        R: ProductLookup + ?Sized,
    {
        let found = self.run_layers(repo, query).await?;
        match &found {
            Some(m) => debug!(
                product_id = m.product_id,
                match_type = m.match_type.as_str(),
                confidence = m.confidence,
                "matched existing product"
            ),
            None => debug!("no product matched"),
        }
        Ok(found)
    }

    async fn run_layers<R>(
        &self,
        repo: &mut R,
        query: &MatchQuery<'_>,
    ) -> StoreResult<Option<ProductMatch>>
    where
        R: ProductLookup + ?Sized,
    {
        if let (Some(store_id), Some(external_id)) = (query.store_id, present(query.external_id)) {
            if let Some(id) = repo.find_by_store_external_id(store_id, external_id).await? {
                return Ok(Some(ProductMatch::new(id, MatchType::ExistingExternalId, 100)));
            }
        }

        if let Some(barcode) = present(query.barcode) {
            if let Some(id) = repo.find_active_by_barcode(barcode).await? {
                return Ok(Some(ProductMatch::new(id, MatchType::Barcode, 100)));
            }
        }

        if let Some(ean) = present(query.ean) {
            if let Some(id) = repo.find_active_by_ean(ean).await? {
                return Ok(Some(ProductMatch::new(id, MatchType::Ean, 100)));
            }
        }

        if let Some(sku) = present(query.sku) {
            if let Some(id) = repo.find_active_by_sku(sku).await? {
                return Ok(Some(ProductMatch::new(id, MatchType::Sku, 98)));
            }
        }

        if let Some(found) = self.match_by_size(repo, query.name).await? {
            return Ok(Some(found));
        }

        self.match_by_similarity(repo, query.name).await
    }

    async fn match_by_size<R>(&self, repo: &mut R, name: &str) -> StoreResult<Option<ProductMatch>>
    where
        R: ProductLookup + ?Sized,
    {
        let volume = extract_volume_ml(name);
        let weight = extract_weight_g(name);
        if volume.is_none() && weight.is_none() {
            return Ok(None);
        }
        let key = name_key(name);
        if key.is_empty() {
            return Ok(None);
        }

        let candidates = repo.find_active_by_name_key(&key).await?;
        let within = |existing: Option<f64>, incoming: f64| {
            existing.is_some_and(|e| (e - incoming).abs() <= self.size_tolerance)
        };

        if let Some(volume) = volume {
            if let Some(c) = candidates.iter().find(|c| within(c.volume_ml, volume)) {
                return Ok(Some(ProductMatch::new(c.id, MatchType::NormalizedNameVolume, 95)));
            }
        }
        if let Some(weight) = weight {
            if let Some(c) = candidates.iter().find(|c| within(c.weight_g, weight)) {
                return Ok(Some(ProductMatch::new(c.id, MatchType::NormalizedNameWeight, 95)));
            }
        }
        Ok(None)
    }

    async fn match_by_similarity<R>(
        &self,
        repo: &mut R,
        name: &str,
    ) -> StoreResult<Option<ProductMatch>>
    where
        R: ProductLookup + ?Sized,
    {
        if name.trim().is_empty() {
            return Ok(None);
        }
        let candidates = repo.similarity_candidates(name, self.candidate_limit).await?;

        // Candidates arrive ordered by id, so a strict comparison keeps the
        // lowest id among equal scores.
        let mut best: Option<(Id, f64)> = None;
        for candidate in &candidates {
            let score = self.scorer.score(name, &candidate.name);
            if score <= self.fuzzy_threshold {
                continue;
            }
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate.id, score));
            }
        }

        Ok(best.map(|(id, score)| {
            let confidence = (score * 100.0).round().clamp(0.0, 100.0) as u8;
            ProductMatch::new(id, MatchType::Fuzzy, confidence)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{NamedCandidate, SizedCandidate};
    use crate::normalization::DerivedName;
    use async_trait::async_trait;

    struct Row {
        id: Id,
        name: &'static str,
        barcode: Option<&'static str>,
        ean: Option<&'static str>,
        sku: Option<&'static str>,
        active: bool,
    }

    fn row(id: Id, name: &'static str) -> Row {
        Row {
            id,
            name,
            barcode: None,
            ean: None,
            sku: None,
            active: true,
        }
    }

    #[derive(Default)]
    struct FakeLookup {
        rows: Vec<Row>,
        listings: Vec<(Id, &'static str, Id)>,
    }

    #[async_trait]
    impl ProductLookup for FakeLookup {
        async fn find_by_store_external_id(
            &mut self,
            store_id: Id,
            external_id: &str,
        ) -> StoreResult<Option<Id>> {
            Ok(self
                .listings
                .iter()
                .find(|(s, e, _)| *s == store_id && *e == external_id)
                .map(|(_, _, p)| *p))
        }

        async fn find_active_by_barcode(&mut self, barcode: &str) -> StoreResult<Option<Id>> {
            Ok(self
                .rows
                .iter()
                .find(|r| r.active && r.barcode == Some(barcode))
                .map(|r| r.id))
        }

        async fn find_active_by_ean(&mut self, ean: &str) -> StoreResult<Option<Id>> {
            Ok(self
                .rows
                .iter()
                .find(|r| r.active && r.ean == Some(ean))
                .map(|r| r.id))
        }

        async fn find_active_by_sku(&mut self, sku: &str) -> StoreResult<Option<Id>> {
            Ok(self
                .rows
                .iter()
                .find(|r| r.active && r.sku == Some(sku))
                .map(|r| r.id))
        }

        async fn find_active_by_name_key(
            &mut self,
            key: &str,
        ) -> StoreResult<Vec<SizedCandidate>> {
            Ok(self
                .rows
                .iter()
                .filter(|r| r.active)
                .map(|r| (r.id, DerivedName::of(r.name)))
                .filter(|(_, d)| d.name_key == key)
                .map(|(id, d)| SizedCandidate {
                    id,
                    volume_ml: d.volume_ml,
                    weight_g: d.weight_g,
                })
                .collect())
        }

        async fn similarity_candidates(
            &mut self,
            _name: &str,
            limit: i64,
        ) -> StoreResult<Vec<NamedCandidate>> {
            Ok(self
                .rows
                .iter()
                .filter(|r| r.active)
                .take(limit as usize)
                .map(|r| NamedCandidate {
                    id: r.id,
                    name: r.name.to_string(),
                })
                .collect())
        }
    }

    fn matcher() -> ProductMatcher {
        ProductMatcher::new(&SyncConfig::default())
    }

    fn named(name: &str) -> MatchQuery<'_> {
        MatchQuery {
            name,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn barcode_beats_a_perfect_name_match() {
        let mut repo = FakeLookup::default();
        repo.rows.push(Row {
            barcode: Some("111"),
            ..row(1, "Fresh Milk 1L")
        });
        repo.rows.push(Row {
            barcode: Some("222"),
            ..row(2, "Orange Juice 1L")
        });

        let query = MatchQuery {
            barcode: Some("222"),
            ..named("Fresh Milk 1L")
        };
        let found = matcher().find_match(&mut repo, &query).await.unwrap().unwrap();
        assert_eq!(found, ProductMatch::new(2, MatchType::Barcode, 100));
    }

    #[tokio::test]
    async fn store_mapping_wins_over_identifiers() {
        let mut repo = FakeLookup::default();
        repo.rows.push(Row {
            barcode: Some("111"),
            ..row(1, "Fresh Milk 1L")
        });
        repo.rows.push(row(2, "Fresh Milk 1L Lite"));
        repo.listings.push((7, "erp-42", 2));

        let query = MatchQuery {
            barcode: Some("111"),
            store_id: Some(7),
            external_id: Some("erp-42"),
            ..named("Fresh Milk 1L")
        };
        let found = matcher().find_match(&mut repo, &query).await.unwrap().unwrap();
        assert_eq!(found.match_type, MatchType::ExistingExternalId);
        assert_eq!(found.product_id, 2);

        // Same external id in another store is unrelated.
        let query = MatchQuery {
            store_id: Some(8),
            ..query
        };
        let found = matcher().find_match(&mut repo, &query).await.unwrap().unwrap();
        assert_eq!(found.match_type, MatchType::Barcode);
    }

    #[tokio::test]
    async fn identifier_layers_in_order() {
        let mut repo = FakeLookup::default();
        repo.rows.push(Row {
            ean: Some("5000112637922"),
            ..row(1, "Cola 330ml")
        });
        repo.rows.push(Row {
            sku: Some("SKU-9"),
            ..row(2, "Cola Zero 330ml")
        });

        let query = MatchQuery {
            barcode: Some("does-not-exist"),
            ean: Some("5000112637922"),
            sku: Some("SKU-9"),
            ..named("Cola Zero 330ml")
        };
        let found = matcher().find_match(&mut repo, &query).await.unwrap().unwrap();
        assert_eq!(found, ProductMatch::new(1, MatchType::Ean, 100));

        let query = MatchQuery {
            ean: Some("  "),
            ..query
        };
        let found = matcher().find_match(&mut repo, &query).await.unwrap().unwrap();
        assert_eq!(found, ProductMatch::new(2, MatchType::Sku, 98));
    }

    #[tokio::test]
    async fn inactive_products_are_skipped() {
        let mut repo = FakeLookup::default();
        repo.rows.push(Row {
            barcode: Some("111"),
            active: false,
            ..row(1, "Discontinued Soda 500ml")
        });
        let query = MatchQuery {
            barcode: Some("111"),
            ..named("Discontinued Soda 500ml")
        };
        assert!(matcher().find_match(&mut repo, &query).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn volume_tolerance_boundary() {
        let mut repo = FakeLookup::default();
        repo.rows.push(row(1, "Fresh Milk 1000ml"));
        let m = matcher();

        let found = m.find_match(&mut repo, &named("Fresh Milk 990ml")).await.unwrap();
        assert_eq!(found, Some(ProductMatch::new(1, MatchType::NormalizedNameVolume, 95)));

        let found = m.find_match(&mut repo, &named("Fresh Milk 1L")).await.unwrap();
        assert_eq!(found.unwrap().match_type, MatchType::NormalizedNameVolume);

        for name in ["Fresh Milk 989ml", "Fresh Milk 980ml"] {
            let found = m.find_match(&mut repo, &named(name)).await.unwrap();
            assert_ne!(
                found.map(|f| f.match_type),
                Some(MatchType::NormalizedNameVolume),
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn weight_layer_uses_grams() {
        let mut repo = FakeLookup::default();
        repo.rows.push(row(1, "Basmati Rice 1kg"));
        repo.rows.push(row(2, "Basmati Rice 5kg"));
        let found = matcher()
            .find_match(&mut repo, &named("Basmati Rice 5000 g"))
            .await
            .unwrap();
        assert_eq!(found, Some(ProductMatch::new(2, MatchType::NormalizedNameWeight, 95)));
    }

    #[tokio::test]
    async fn fuzzy_picks_highest_score_then_lowest_id() {
        let mut repo = FakeLookup::default();
        repo.rows.push(row(1, "Dairy Milk Chocolate"));
        repo.rows.push(row(2, "Dairy Milk Chocolate"));
        repo.rows.push(row(3, "Dark Chocolate Bar"));

        let found = matcher()
            .find_match(&mut repo, &named("Dairy Milk Chocolates"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.product_id, 1);
        assert_eq!(found.match_type, MatchType::Fuzzy);
        assert!(found.confidence > 45 && found.confidence < 100);
    }

    #[tokio::test]
    async fn nothing_above_threshold_is_no_match() {
        let mut repo = FakeLookup::default();
        repo.rows.push(row(1, "Basmati Rice"));
        let found = matcher()
            .find_match(&mut repo, &named("Orange Juice"))
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
