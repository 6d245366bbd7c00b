use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    errors::ApiError,
    handlers::AppState,
    services::{dashboard::DashboardSummary, storage::ProcessedFile},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardData {
    pub summary: DashboardSummary,
    pub all_files: Vec<ProcessedFile>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub dashboard: DashboardData,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FilesResponse {
    pub files: Vec<ProcessedFile>,
    pub count: usize,
}

/// Summary and KPIs over every stored upload
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard summary and stored documents", body = DashboardResponse),
        (status = 500, description = "Storage could not be read", body = crate::errors::ErrorResponse)
    ),
    tag = "Dashboard"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let (summary, all_files) = state.dashboard.overview().await?;
    Ok(Json(DashboardResponse {
        dashboard: DashboardData { summary, all_files },
    }))
}

/// Every stored document, newest first
#[utoipa::path(
    get,
    path = "/dashboard/files",
    responses(
        (status = 200, description = "Stored documents", body = FilesResponse),
        (status = 500, description = "Storage could not be read", body = crate::errors::ErrorResponse)
    ),
    tag = "Dashboard"
)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FilesResponse>, ApiError> {
    let files = state.dashboard.all_files().await?;
    Ok(Json(FilesResponse {
        count: files.len(),
        files,
    }))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/files", get(list_files))
}
