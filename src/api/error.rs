//! API error handling.
//!
//! Every failure reaching a handler leaves as `{ "message": string }` with a
//! status derived from its error class.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::downloader::errors::{DownloadError, ResolveError};
use crate::downloader::extractors::ErrorClass;
use crate::history::HistoryError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub message: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Status and public message for a classified upstream failure; the
    /// detail is logged, never sent.
    pub fn from_class(class: ErrorClass, detail: &dyn std::fmt::Display) -> Self {
        let status = match class {
            ErrorClass::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorClass::PageStructureChanged => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorClass::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match class {
            ErrorClass::Unknown => tracing::error!("Upstream failure: {}", detail),
            _ => tracing::warn!("Upstream failure ({:?}): {}", class, detail),
        }

        Self::new(status, class.public_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse { message: self.message };
        (self.status, Json(body)).into_response()
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        Self::from_class(err.class(), &err)
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        Self::from_class(err.class(), &err)
    }
}

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        tracing::error!("History error: {}", err);
        ApiError::internal("Database error occurred")
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
