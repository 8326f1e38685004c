// API server implementation using actix-web

use crate::api::state::AppState;
use crate::api::{auth, middleware, routes};
use crate::util::env::{env_opt, env_parse, env_req};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub api_secret: String,
    pub allowed_origins: String,
    pub max_db_connections: u32,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match env_opt("API_PORT") {
            Some(raw) => raw.trim().parse().context("Invalid API_PORT")?,
            None => 8080,
        };

        let api_secret =
            env_req("API_SECRET").context("API_SECRET environment variable is required")?;

        let allowed_origins = env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:8000".to_string());

        Ok(Self {
            host,
            port,
            api_secret,
            allowed_origins,
            max_db_connections: env_parse("DB_MAX_CONNS", 10u32),
        })
    }

    /// Start the HTTP server
    pub async fn run(self, state: AppState) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            push_timeout_secs = state.push_timeout.as_secs(),
            "Starting catalog-sync API server"
        );

        let state = web::Data::new(state);
        let api_secret = self.api_secret.clone();
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);
            let auth = auth::Auth::new(api_secret.clone());

            App::new()
                .app_data(state.clone())
                .wrap(auth)
                .wrap(cors)
                .wrap(compress)
                .wrap(logger)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
