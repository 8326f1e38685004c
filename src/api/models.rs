// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::matcher::{MatchQuery, MatchType, ProductMatch};
use crate::catalog::models::Id;

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// "connected", "disconnected", or "in-memory".
    pub database: String,
    pub uptime_seconds: u64,
}

/// Body of `POST /api/v1/catalog/match`.
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub ean: Option<String>,
    /// ERP store identifier (the `store_details.id` used when pushing).
    #[serde(default, alias = "store")]
    pub store_id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl MatchRequest {
    pub fn query(&self) -> MatchQuery<'_> {
        MatchQuery {
            name: &self.name,
            barcode: self.barcode.as_deref(),
            sku: self.sku.as_deref(),
            ean: self.ean.as_deref(),
            store_id: None,
            external_id: self.external_id.as_deref(),
        }
    }
}

/// Matcher verdict; `match_type = none` and confidence 0 when nothing matched.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MatchResponse {
    pub product_id: Option<Id>,
    pub match_type: MatchType,
    pub confidence: u8,
}

impl From<Option<ProductMatch>> for MatchResponse {
    fn from(found: Option<ProductMatch>) -> Self {
        match found {
            Some(m) => Self {
                product_id: Some(m.product_id),
                match_type: m.match_type,
                confidence: m.confidence,
            },
            None => Self {
                product_id: None,
                match_type: MatchType::None,
                confidence: 0,
            },
        }
    }
}
