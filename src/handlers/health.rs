use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use std::time::Instant;
use tracing::warn;

use crate::handlers::AppState;

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Basic health check
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is running", body = serde_json::Value)),
    tag = "Health"
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Liveness probe - the process is up and answering
#[utoipa::path(
    get,
    path = "/health/live",
    responses((status = 200, description = "Liveness details", body = serde_json::Value)),
    tag = "Health"
)]
pub async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": get_uptime_secs(),
    }))
}

/// Readiness probe - the upload directory accepts writes
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Ready to accept uploads", body = serde_json::Value),
        (status = 503, description = "Storage is not writable", body = serde_json::Value)
    ),
    tag = "Health"
)]
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let storage_result = state.storage.check_writable().await;
    let storage_latency = start.elapsed().as_millis() as u64;

    match storage_result {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": {
                    "storage": {
                        "status": "up",
                        "latency_ms": storage_latency
                    }
                }
            })),
        )),
        Err(error) => {
            warn!(%error, "readiness check failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "checks": {
                        "storage": {
                            "status": "down",
                            "error": error.to_string()
                        }
                    }
                })),
            ))
        }
    }
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
}
