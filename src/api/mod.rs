//! HTTP API.
//!
//! One router per concern, assembled in [`create_api_router`]:
//! - `/api/auth/*` — local login, refresh, me, password reset
//! - `/api/auth/:provider[/callback]` — Google/Microsoft OAuth login
//! - `/api/auth/meta/*` and `/api/instagram/*` — Instagram linking + sync

pub mod auth;
pub mod auth_middleware;
pub mod instagram;
pub mod oauth;

pub use auth_middleware::{extract_bearer_token, require_auth};

use crate::email::EmailSender;
use crate::error::ApiError;
use crate::meta::MetaClient;
use crate::store::Store;
use crate::token::TokenService;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
    pub email: Arc<dyn EmailSender>,
    /// None when the Meta integration is not configured; the linking
    /// endpoints then return an actionable error.
    pub meta: Option<MetaClient>,
    /// Base URL the OAuth flows redirect the browser to.
    pub frontend_url: String,
}

/// Assemble the full API router.
pub fn create_api_router(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .merge(auth::create_auth_router(state.clone()))
        .merge(oauth::create_oauth_router(state.clone()))
        .merge(instagram::create_instagram_router(state))
        .layer(CorsLayer::permissive())
}

/// JSON extractor that reports malformed bodies as our structured 400
/// instead of axum's default rejection.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}
