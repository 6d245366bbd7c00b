use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::{errors::ApiError, handlers::AppState, services::storage::ProcessedFile};

/// Multipart form accepted by `/upload`
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// CSV export or PDF invoice
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub data: ProcessedFile,
}

/// Upload a CSV export or a PDF invoice
#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File processed and stored", body = UploadResponse),
        (status = 400, description = "Missing file or unsupported type", body = crate::errors::ErrorResponse),
        (status = 500, description = "File could not be processed", body = crate::errors::ErrorResponse)
    ),
    tag = "Uploads"
)]
#[instrument(skip(state, multipart))]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        debug!(file_name = ?file_name, size = bytes.len(), "received upload");

        let document = state
            .uploads
            .process_file(file_name.as_deref(), bytes.to_vec())
            .await?;

        return Ok(Json(UploadResponse {
            message: "File processed successfully".to_string(),
            data: document,
        }));
    }

    Err(ApiError::bad_request("No file provided"))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload", post(upload_file))
}
