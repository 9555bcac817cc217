//! Invoice ML Server Library
//!
//! Upload scanned invoices, extract structured fields from their text,
//! collect user corrections and retrain the extraction model from them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod extraction;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod ml;
pub mod ocr;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires every service from configuration, using the configured text
    /// extraction backend.
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let extractor = ocr::text_extractor_for(config.ocr_backend);
        Self::with_text_extractor(db, config, extractor)
    }

    pub fn with_text_extractor(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        extractor: Arc<dyn ocr::TextExtractor>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config, extractor);
        Self {
            db,
            config,
            services,
        }
    }
}

/// All API routes, without middleware.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::health::health_routes())
        .merge(handlers::uploads::upload_routes())
        .merge(handlers::training::training_routes())
        .nest("/invoices", handlers::invoices::invoice_routes())
        .nest("/invoice-items", handlers::invoice_items::invoice_item_routes())
        .nest("/suppliers", handlers::suppliers::supplier_routes())
}

/// CORS policy from configuration. Outside development an explicit origin
/// list or `cors_allow_any_origin` is required.
pub fn cors_layer(cfg: &config::AppConfig) -> Result<CorsLayer, errors::ServiceError> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            environment = %cfg.environment,
            "Using permissive CORS because explicit origins were not configured"
        );
        Ok(CorsLayer::permissive())
    } else {
        Err(errors::ServiceError::InternalError(
            "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
                .to_string(),
        ))
    }
}

/// The complete application: routes, Swagger UI and the middleware stack.
pub fn build_router(state: AppState) -> Result<Router, errors::ServiceError> {
    let cors = cors_layer(&state.config)?;
    let body_limit = state.config.max_upload_bytes;

    let app = api_routes()
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(body_limit))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state);
    Ok(app)
}
