//! Oreka API Library
//!
//! Ingestion of restaurant POS exports and supplier invoices, flat JSON
//! storage of processed uploads, and decimal-exact financial KPIs.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use ::tracing::info;

use crate::config::AppConfig;
use crate::errors::StartupError;
use crate::services::{
    dashboard::DashboardService,
    invoice_ai::{InvoiceInterpreter, MistralInvoiceClient},
    kpi::price_index,
    pos_records::load_price_list_file,
    storage::FileStore,
    uploads::UploadService,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: FileStore,
    pub uploads: UploadService,
    pub dashboard: DashboardService,
}

impl AppState {
    /// Opens the upload store and wires the services from configuration.
    pub async fn initialize(config: AppConfig) -> Result<Self, StartupError> {
        let storage = FileStore::open(config.storage_dir.clone()).await?;

        let interpreter: Option<Arc<dyn InvoiceInterpreter>> =
            match MistralInvoiceClient::from_config(&config.ai)? {
                Some(client) => {
                    info!(model = %config.ai.model, "AI invoice interpretation enabled");
                    Some(Arc::new(client))
                }
                None => None,
            };

        let price_list = match &config.price_list_path {
            Some(path) => {
                let items = load_price_list_file(path)?;
                info!(path = %path.display(), items = items.len(), "loaded price list");
                Some(price_index(&items))
            }
            None => None,
        };

        let uploads = UploadService::new(storage.clone(), interpreter);
        let dashboard =
            DashboardService::new(storage.clone(), price_list, config.recent_files_limit);

        Ok(Self {
            config: Arc::new(config),
            storage,
            uploads,
            dashboard,
        })
    }
}

/// Every route plus the per-request layers. CORS and compression are added
/// by the server binary.
pub fn app_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::root))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(handlers::health::health_routes())
        .merge(handlers::uploads::upload_routes())
        .merge(handlers::dashboard::dashboard_routes())
        .merge(handlers::kpi::kpi_routes())
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(metrics::track_http_metrics))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
