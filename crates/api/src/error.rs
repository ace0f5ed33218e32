//! HTTP error responses

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inference_engine::PredictError;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by the request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("File must be an image")]
    NotAnImage,

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Invalid form: {0}")]
    Form(#[from] MultipartRejection),

    #[error(transparent)]
    Prediction(#[from] PredictError),

    #[error("Prediction timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::NotAnImage => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Form(e) => e.status(),
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Prediction(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Error processing request: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
