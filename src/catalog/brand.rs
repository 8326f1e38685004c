use chrono::Utc;
use tracing::{debug, instrument};

use crate::catalog::models::{Id, NewBrand};
use crate::database_ops::store::{BrandRepository, StoreResult};
use crate::error::StoreError;
use crate::normalization::{compact_key, slugify};

const MAX_CREATE_ATTEMPTS: usize = 4;
const FALLBACK_SLUG: &str = "brand";

fn disambiguated_slug(base: &str, attempt: usize) -> String {
    let stamp = Utc::now().timestamp_millis();
    if attempt <= 1 {
        format!("{base}-{stamp}")
    } else {
        format!("{base}-{stamp}-{attempt}")
    }
}

/// Find-or-create for brands.
///
/// Lookup is by exact raw name, then by compact normalized key; only when
/// both miss is a brand inserted. An insert rejected by a uniqueness
/// constraint means a concurrent writer won, so the lookup is retried rather
/// than failing. Blank names resolve to `None`.
#[instrument(skip(repo))]
pub async fn resolve_brand<R>(repo: &mut R, raw_name: Option<&str>) -> StoreResult<Option<Id>>
where
    R: BrandRepository + ?Sized,
{
    let Some(name) = raw_name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let key = compact_key(name);
    let mut base_slug = slugify(name);
    if base_slug.is_empty() {
        base_slug = FALLBACK_SLUG.to_string();
    }

    for attempt in 0..MAX_CREATE_ATTEMPTS {
        if let Some(id) = repo.find_by_exact_name(name).await? {
            debug!(brand_id = id, "brand matched by name");
            return Ok(Some(id));
        }
        if !key.is_empty() {
            if let Some(id) = repo.find_by_normalized_name(&key).await? {
                debug!(brand_id = id, normalized = %key, "brand matched by normalized name");
                return Ok(Some(id));
            }
        }

        let slug = if attempt == 0 && !repo.slug_exists(&base_slug).await? {
            base_slug.clone()
        } else {
            disambiguated_slug(&base_slug, attempt.max(1))
        };
        let brand = NewBrand {
            name: name.to_string(),
            normalized_name: key.clone(),
            slug,
        };
        match repo.insert(&brand).await? {
            Some(id) => {
                debug!(brand_id = id, slug = %brand.slug, "brand created");
                return Ok(Some(id));
            }
            None => {
                debug!(attempt, slug = %brand.slug, "brand insert hit a uniqueness conflict; retrying lookup");
            }
        }
    }

    Err(StoreError::Contention(format!("brand '{name}'")))
}
