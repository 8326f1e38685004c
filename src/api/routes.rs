// API route configuration

use crate::api::handlers;
use actix_web::web;

/// Upper bound on a push body; whole-store catalogs are large.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(MAX_BODY_BYTES)
            .error_handler(handlers::json_error_handler),
    )
    // Health check (no auth required)
    .route("/health", web::get().to(handlers::health_check))
    .route("/", web::get().to(handlers::health_check))
    // API v1 routes (all require authentication)
    .service(
        web::scope("/api/v1/catalog")
            .route("/push", web::post().to(handlers::push_catalog))
            .route("/match", web::post().to(handlers::match_product)),
    );
}
