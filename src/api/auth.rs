//! Local authentication endpoints: login, token refresh, current user,
//! and the password-reset flow.

use super::{require_auth, ApiJson, AppState};
use crate::error::ApiError;
use crate::password::{generate_reset_code, hash_password, verify_password};
use crate::session::issue_session;
use crate::store::{Provider, User};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const RESET_CODE_TTL_MINUTES: i64 = 15;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    refresh_token: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    email: String,
}

#[derive(Deserialize)]
pub struct VerifyResetCodeRequest {
    email: String,
    code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    email: String,
    code: String,
    new_password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

pub fn create_auth_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/verify-reset-code", post(verify_reset_code))
        .route("/api/auth/reset-password", post(reset_password))
        .with_state(state)
}

/// POST /api/auth/login
///
/// Unknown email and wrong password produce the same 401. A pure-OAuth
/// account (no password set) gets a message naming the provider to use
/// instead.
async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .store
        .find_user_by_email(&body.email)?
        .ok_or_else(invalid_credentials)?;

    let Some(hash) = user.password_hash.as_deref() else {
        let provider = user.provider.unwrap_or(Provider::Local);
        warn!(user_id = user.id, "Password login attempted on passwordless account");
        return Err(ApiError::Unauthenticated(format!(
            "This account uses {} login. Sign in with {} instead.",
            provider, provider
        )));
    };

    if !verify_password(&body.password, hash) {
        return Err(invalid_credentials());
    }

    let bundle = issue_session(state.store.as_ref(), &state.tokens, &user)?;
    info!(user_id = user.id, "Login successful");

    Ok(Json(json!({
        "accessToken": bundle.access_token,
        "refreshToken": bundle.refresh_token,
        "user": bundle.user,
    })))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthenticated("Invalid credentials".to_string())
}

/// POST /api/auth/refresh
///
/// The signature alone is not enough: the token must also exist in the
/// store and not be revoked.
async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    if body.refresh_token.is_empty() {
        return Err(ApiError::Unauthenticated(
            "Refresh token required".to_string(),
        ));
    }

    let record = state.store.find_refresh_token(&body.refresh_token)?;
    let valid_in_store = record.map(|r| !r.revoked).unwrap_or(false);
    if !valid_in_store {
        return Err(ApiError::Forbidden(
            "Invalid or revoked refresh token".to_string(),
        ));
    }

    let claims = state
        .tokens
        .verify_refresh_token(&body.refresh_token)
        .map_err(|_| ApiError::Forbidden("Invalid refresh token".to_string()))?;

    let user = state
        .store
        .find_user_by_id(claims.sub)?
        .ok_or_else(|| ApiError::Forbidden("User not found".to_string()))?;

    let access_token = state
        .tokens
        .issue_access_token(user.id, user.role, user.company_id)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(RefreshResponse { access_token }))
}

/// GET /api/auth/me
async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let claims = require_auth(&state.tokens, &headers)?;
    let user = state
        .store
        .find_user_by_id(claims.sub)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(serde_json::to_value(user.public()).unwrap_or_default()))
}

/// POST /api/auth/forgot-password
///
/// Always answers with the same generic message so the endpoint cannot be
/// used to probe which addresses exist. Email delivery is fire-and-forget;
/// failures are only logged.
async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.email.is_empty() || !body.email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".to_string()));
    }

    if state.store.find_user_by_email(&body.email)?.is_some() {
        let code = generate_reset_code();
        let expires_at = Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES);
        state.store.set_reset_code(&body.email, &code, expires_at)?;

        let email = state.email.clone();
        let to = body.email.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = email.send_password_reset(&to, &code) {
                warn!(error = %e, "Failed to send password reset email");
            }
        });
    }

    Ok(Json(json!({
        "message": "If the email exists, a reset code has been sent."
    })))
}

/// POST /api/auth/verify-reset-code
///
/// Optional client-side check. Does not consume the code.
async fn verify_reset_code(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<VerifyResetCodeRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_reset_code(state.store.find_user_by_reset_code(&body.code)?, &body.email)?;
    Ok(Json(json!({ "message": "Code is valid", "valid": true })))
}

/// POST /api/auth/reset-password
///
/// Re-validates the code, then updates the password. The storage update
/// clears the code, which is what enforces single use.
async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user = validate_reset_code(state.store.find_user_by_reset_code(&body.code)?, &body.email)?;

    let hash = hash_password(&body.new_password)?;
    state.store.update_password(user.id, &hash)?;
    info!(user_id = user.id, "Password reset completed");

    Ok(Json(json!({ "message": "Password updated successfully" })))
}

/// Check a looked-up user against the requesting email and the code's
/// expiry. Mismatch, expiry, and absence all yield the same generic error.
fn validate_reset_code(user: Option<User>, email: &str) -> Result<User, ApiError> {
    let generic = || ApiError::Validation("Invalid or expired code".to_string());

    let user = user.ok_or_else(generic)?;
    if user.email != email {
        return Err(generic());
    }
    match user.reset_code_expires_at {
        Some(expires_at) if expires_at > Utc::now() => Ok(user),
        _ => Err(generic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;

    fn sample_user(code: Option<&str>, expires_in_minutes: i64) -> User {
        User {
            id: 1,
            email: "a@x.com".to_string(),
            name: "Alice".to_string(),
            password_hash: Some("h".to_string()),
            provider: Some(Provider::Local),
            provider_id: None,
            role: Role::Client,
            company_id: None,
            reset_code: code.map(|c| c.to_string()),
            reset_code_expires_at: Some(Utc::now() + Duration::minutes(expires_in_minutes)),
        }
    }

    #[test]
    fn test_validate_reset_code_happy_path() {
        let user = sample_user(Some("123456"), 10);
        assert!(validate_reset_code(Some(user), "a@x.com").is_ok());
    }

    #[test]
    fn test_validate_reset_code_wrong_email() {
        let user = sample_user(Some("123456"), 10);
        assert!(validate_reset_code(Some(user), "b@x.com").is_err());
    }

    #[test]
    fn test_validate_reset_code_expired() {
        let user = sample_user(Some("123456"), -1);
        assert!(validate_reset_code(Some(user), "a@x.com").is_err());
    }

    #[test]
    fn test_validate_reset_code_absent() {
        assert!(validate_reset_code(None, "a@x.com").is_err());
    }
}
