// Error types for the API server

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::upload::UploadRejection;
use crate::{
    imaging::ImagingError,
    settings::{Operation, SettingsError},
};

/// API server error types
#[derive(Debug)]
pub enum ApiError {
    // The multipart upload itself was unusable
    Upload(UploadRejection),
    // The `settings` field failed validation
    InvalidSettings(SettingsError),
    // The image library failed; the detail is logged, not returned
    Processing {
        operation: Operation,
        source: ImagingError,
    },
    NotImplemented(String),
    InternalServerError(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Upload(rejection) => (
                StatusCode::BAD_REQUEST,
                rejection.code(),
                rejection.message().to_string(),
            ),
            Self::InvalidSettings(err) => {
                (StatusCode::BAD_REQUEST, "INVALID_SETTINGS", err.to_string())
            }
            Self::Processing { operation, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROCESSING_FAILED",
                operation.failure_message().to_string(),
            ),
            Self::NotImplemented(msg) => {
                (StatusCode::NOT_IMPLEMENTED, "NOT_IMPLEMENTED", msg.clone())
            }
            Self::InternalServerError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Processing { operation, source } => {
                tracing::error!(operation = operation.as_str(), "Image processing failed: {}", source);
            }
            Self::InternalServerError(detail) => {
                tracing::error!("Internal server error: {}", detail);
            }
            _ => {}
        }

        let (status, code, message) = self.parts();

        // `error` is the string the browser client displays.
        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<UploadRejection> for ApiError {
    fn from(rejection: UploadRejection) -> Self {
        Self::Upload(rejection)
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        Self::InvalidSettings(err)
    }
}
