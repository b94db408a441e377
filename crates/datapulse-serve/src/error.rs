//! API error types and response formatting.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use datapulse_core::metrics::STORAGE_ERRORS_TOTAL;
use serde::Serialize;

use crate::store::StoreError;

/// Message returned for every server-side failure.
const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid shared secret.
    #[error("unauthorized")]
    Unauthorized,

    /// Missing or malformed request input. The message is shown to the caller.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Event Store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::Unauthorized => (StatusCode::FORBIDDEN, "Unauthorized".to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Storage(err) => {
                // Details stay in the log; callers only see the generic message.
                tracing::error!(error = %err, "storage error");
                metrics::counter!(STORAGE_ERRORS_TOTAL).increment(1);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_MESSAGE.to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}
