//! API error type shared by all handlers.
//!
//! Every failure surfaces as a JSON body of the form `{"message": "..."}`
//! with the matching HTTP status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad input from the caller (missing file, wrong type, malformed id).
    #[error("{0}")]
    Validation(String),

    /// Unknown item id or a stored file that no longer exists.
    #[error("{0}")]
    NotFound(String),

    /// No generation vendor is configured.
    #[error("{0}")]
    Unavailable(String),

    /// The vendor call failed; carries the vendor's message text.
    #[error("{0}")]
    Generation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Generation(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            tracing::error!("Internal error: {:#}", err);
        }
        (self.status(), Json(json!({ "message": self.to_string() }))).into_response()
    }
}
