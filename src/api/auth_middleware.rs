//! Bearer-token authentication for API endpoints.
//!
//! Handlers call [`require_auth`] with the request headers; the result is
//! the verified access-token claims. All failures collapse to a single 401
//! message so clients learn nothing beyond "invalid or expired".

use crate::error::ApiError;
use crate::token::{AccessClaims, TokenService};
use axum::http::HeaderMap;

/// Extract the bearer token from the Authorization header.
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Authenticate a request: extract the bearer token and verify it as an
/// access token.
pub fn require_auth(tokens: &TokenService, headers: &HeaderMap) -> Result<AccessClaims, ApiError> {
    let token = extract_bearer_token(headers)
        .map_err(|_| ApiError::Unauthenticated("Not authenticated".to_string()))?;
    tokens
        .verify_access_token(&token)
        .map_err(|_| ApiError::Unauthenticated("Invalid or expired token".to_string()))
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Invalid format (not "Bearer <token>")
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}
