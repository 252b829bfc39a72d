//! API error taxonomy.
//!
//! Every JSON endpoint reports failures as `{"message": ...}` with a status
//! drawn from this enum. The browser-facing OAuth callbacks never use it —
//! they always redirect to the frontend with a sanitized error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// Application error for JSON endpoints.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input (400).
    Validation(String),
    /// Missing, invalid, or expired credential (401).
    Unauthenticated(String),
    /// Authenticated but not permitted (403).
    Forbidden(String),
    /// Resource does not exist (404).
    NotFound(String),
    /// The stored Instagram token was rejected by the Graph API (401,
    /// with an actionable reconnect message).
    InstagramTokenExpired,
    /// An identity or resource provider failed or timed out (502). The
    /// message is provider-scoped, never a raw provider payload.
    ExternalProvider(String),
    /// Anything else. The detail is logged; the client sees a generic 500.
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InstagramTokenExpired => (
                StatusCode::UNAUTHORIZED,
                "Instagram token expired or invalid. Reconnect Instagram in settings.".to_string(),
            ),
            ApiError::ExternalProvider(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(e) => {
                error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}
