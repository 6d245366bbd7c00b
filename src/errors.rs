use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::{
    csv_import::CsvImportError, invoice_ai::InvoiceAiError, kpi::KpiError,
    pdf_extraction::PdfExtractionError, pos_records::PriceListError, storage::StorageError,
};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Bad request: Unsupported file type: xlsx. Only CSV and PDF files are supported.",
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Internal Server Error")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Failure while turning an accepted upload into a document. The
    /// message already names the file kind.
    #[error("{0}")]
    ProcessingError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<KpiError> for ServiceError {
    fn from(err: KpiError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::StorageError(err.to_string())
    }
}

impl From<CsvImportError> for ServiceError {
    fn from(err: CsvImportError) -> Self {
        ServiceError::ProcessingError(format!("Error processing CSV: {}", err))
    }
}

impl From<PdfExtractionError> for ServiceError {
    fn from(err: PdfExtractionError) -> Self {
        ServiceError::ProcessingError(format!("Error processing PDF: {}", err))
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ProcessingError(_) | Self::StorageError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::StorageError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(ErrorResponse::new(status, self.response_message()))).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    /// Rejected request body or multipart stream
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::ServiceError(service_error) => service_error.into_response(),
            ApiError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                (status, Json(ErrorResponse::new(status, message))).into_response()
            }
        }
    }
}

/// Failures while wiring the application from configuration
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open upload storage: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to build AI client: {0}")]
    InvoiceAi(#[from] InvoiceAiError),

    #[error("failed to load price list: {0}")]
    PriceList(#[from] PriceListError),
}
