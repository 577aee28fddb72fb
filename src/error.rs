use std::fmt;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub enum AppError {
    Unauthenticated,
    InvalidCredential(String),
    ValidationServiceUnavailable(String),
    BackendError(String),
    UnknownFailure(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Unauthenticated => write!(f, "unauthenticated: no API key supplied"),
            AppError::InvalidCredential(msg) => write!(f, "invalid credential: {msg}"),
            AppError::ValidationServiceUnavailable(msg) => {
                write!(f, "validation service unavailable: {msg}")
            }
            AppError::BackendError(msg) => write!(f, "backend error: {msg}"),
            AppError::UnknownFailure(msg) => write!(f, "unknown failure: {msg}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::Unauthenticated => {
                tracing::warn!(error_type = "unauthenticated", "Responding with 401");
                (
                    StatusCode::UNAUTHORIZED,
                    "API key required".to_string(),
                    "Please provide a valid API key in the x-api-key header, Authorization header, or api_key query parameter.".to_string(),
                )
            }
            AppError::InvalidCredential(msg) => {
                tracing::warn!(error_type = "invalid_credential", message = %msg, "Responding with 403");
                (StatusCode::FORBIDDEN, "Invalid API key".to_string(), msg)
            }
            AppError::ValidationServiceUnavailable(detail) => {
                tracing::error!(error_type = "validation_unavailable", error = %detail, "Responding with 503");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Validation service unavailable".to_string(),
                    "Unable to validate API key. Please try again later.".to_string(),
                )
            }
            AppError::BackendError(msg) => {
                tracing::error!(error_type = "backend", error = %msg, "Responding with 500");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    msg,
                    "Image generation failed".to_string(),
                )
            }
            AppError::UnknownFailure(msg) => {
                tracing::error!(error_type = "unknown", error = %msg, "Responding with 500");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Image generation failed".to_string(),
                    msg,
                )
            }
        };
        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::UnknownFailure(e.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::UnknownFailure(format!("could not read form data: {e}"))
    }
}

impl From<MultipartRejection> for AppError {
    fn from(e: MultipartRejection) -> Self {
        AppError::UnknownFailure(format!("could not read form data: {}", e.body_text()))
    }
}
