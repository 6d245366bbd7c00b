use crate::errors::ApiError;
use axum::{extract::rejection::JsonRejection, Json};

/// Unwraps a JSON body, turning extractor rejections into the shared error shape.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}
