pub mod common;
pub mod dashboard;
pub mod health;
pub mod kpi;
pub mod uploads;

use axum::{response::IntoResponse, Json};
use serde_json::json;

pub use crate::AppState;

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "API banner", body = serde_json::Value)),
    tag = "System"
)]
pub async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Oreka Backend API" }))
}
