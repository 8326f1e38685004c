// HTTP request handlers for API endpoints

use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse, Result};
use tracing::{error, info, warn};

use crate::api::models::*;
use crate::api::state::AppState;
use crate::catalog::payload::{CatalogPush, PushSummary};
use crate::error::SyncError;

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let db_status = match &state.db {
        Some(db) => match sqlx::query_scalar::<_, bool>("SELECT true")
            .persistent(false)
            .fetch_one(&db.pool)
            .await
        {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        None => "in-memory",
    };

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Bulk catalog push from an ERP
pub async fn push_catalog(
    state: web::Data<AppState>,
    payload: web::Json<CatalogPush>,
) -> Result<HttpResponse> {
    info!(
        store = %payload.store_details.id,
        products = payload.products.len(),
        variations = payload.variations.len(),
        store_products = payload.store_products.len(),
        "catalog push received"
    );

    let result = state
        .reconciler
        .push_catalog_within(&payload, state.push_timeout)
        .await;
    match result {
        Ok(summary) => Ok(HttpResponse::Ok().json(ApiResponse::<PushSummary>::success(summary))),
        Err(err) => Ok(sync_error_response(&err)),
    }
}

/// Matcher lookup without writing anything
pub async fn match_product(
    state: web::Data<AppState>,
    request: web::Json<MatchRequest>,
) -> Result<HttpResponse> {
    if request.name.trim().is_empty() {
        return Ok(HttpResponse::UnprocessableEntity()
            .json(ApiResponse::<()>::error("name is required")));
    }

    match state
        .reconciler
        .match_product(request.store_id.as_deref(), request.query())
        .await
    {
        Ok(found) => {
            let body = MatchResponse::from(found);
            Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
        }
        Err(err) => {
            error!(error = %err, "match query failed");
            Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("match query failed")))
        }
    }
}

/// Client errors carry their details; storage failures only name the stage.
pub fn sync_error_response(err: &SyncError) -> HttpResponse {
    match err {
        SyncError::Validation(_) | SyncError::UnknownReference { .. } => {
            warn!(error = %err, "catalog push rejected");
            HttpResponse::UnprocessableEntity().json(ApiResponse::<()>::error(err.to_string()))
        }
        SyncError::Timeout(_) => {
            HttpResponse::GatewayTimeout().json(ApiResponse::<()>::error(err.to_string()))
        }
        SyncError::Stage { .. } => {
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error(err.to_string()))
        }
    }
}

/// Malformed JSON bodies get the standard envelope instead of actix's plain text.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = format!("invalid request body: {err}");
    let response = HttpResponse::BadRequest().json(ApiResponse::<()>::error(message));
    actix_web::error::InternalError::from_response(err, response).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::configure_routes;
    use crate::config::SyncConfig;
    use crate::database_ops::MemoryCatalog;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn state(catalog: &MemoryCatalog) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            Arc::new(catalog.clone()),
            &SyncConfig::default(),
            None,
        ))
    }

    fn body() -> Value {
        json!({
            "store_details": { "id": "s1", "name": "Corner Shop", "latitude": 1.3, "longitude": 103.8 },
            "products": [
                { "external_id": "p1", "name": "Fresh Milk 1L", "barcode": "888", "price": "3.20" }
            ]
        })
    }

    #[actix_web::test]
    async fn push_then_match_by_barcode() {
        let catalog = MemoryCatalog::new();
        let app = test::init_service(App::new().app_data(state(&catalog)).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/push")
            .set_json(body())
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["success"], true);
        assert_eq!(resp["data"]["products_created"], 1);

        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/match")
            .set_json(json!({ "name": "Something Else", "barcode": "888" }))
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["data"]["match_type"], "barcode");
        assert_eq!(resp["data"]["confidence"], 100);
    }

    #[actix_web::test]
    async fn unmatched_query_reports_none() {
        let catalog = MemoryCatalog::new();
        let app = test::init_service(App::new().app_data(state(&catalog)).configure(configure_routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/match")
            .set_json(json!({ "name": "Fresh Milk 1L", "store_id": "nowhere", "external_id": "p1" }))
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["data"]["match_type"], "none");
        assert_eq!(resp["data"]["confidence"], 0);
        assert!(resp["data"]["product_id"].is_null());
    }

    #[actix_web::test]
    async fn invalid_push_is_unprocessable() {
        let catalog = MemoryCatalog::new();
        let app = test::init_service(App::new().app_data(state(&catalog)).configure(configure_routes)).await;
        let mut payload = body();
        payload["products"] = json!([]);
        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/push")
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn storage_failure_names_only_the_stage() {
        let catalog = MemoryCatalog::new();
        catalog.fail_on("upsert_listing");
        let app = test::init_service(App::new().app_data(state(&catalog)).configure(configure_routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/push")
            .set_json(body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "catalog push failed during store product upsert");
        assert!(catalog.snapshot().await.products.is_empty());
    }

    #[actix_web::test]
    async fn malformed_json_uses_envelope() {
        let catalog = MemoryCatalog::new();
        let app = test::init_service(App::new().app_data(state(&catalog)).configure(configure_routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/push")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"store_details\": 5}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn health_reports_in_memory_store() {
        let catalog = MemoryCatalog::new();
        let app = test::init_service(App::new().app_data(state(&catalog)).configure(configure_routes)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["data"]["database"], "in-memory");
    }

    #[::core::prelude::v1::test]
    fn timeout_maps_to_gateway_timeout() {
        let resp = sync_error_response(&SyncError::Timeout(std::time::Duration::from_secs(1)));
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
