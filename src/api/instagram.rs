//! Meta/Instagram linking and sync endpoints.
//!
//! Linking flow:
//! 1. GET /api/auth/meta/start (authenticated) → JSON with the Facebook
//!    authorization URL; the signed state token embeds {company_id, user_id}
//! 2. User authorizes on facebook.com
//! 3. GET /api/auth/meta/callback → verify state, exchange code for a
//!    long-lived token, pick the first Page with a linked Instagram
//!    Business account, persist the connection, redirect to settings
//!
//! The callback is a browser navigation, so every outcome is a redirect to
//! `FRONTEND_URL/settings` with either `instagram_connected=1` or an
//! `instagram_error` code.

use super::{require_auth, AppState};
use crate::error::ApiError;
use crate::meta::{MetaClient, MetaError};
use crate::store::{Company, DailyMetric, InstagramConnection, Post, Role};
use crate::token::AccessClaims;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

const FACEBOOK_DIALOG_URL: &str = "https://www.facebook.com/v18.0/dialog/oauth";
const META_SCOPES: &str =
    "pages_show_list,pages_read_engagement,instagram_basic,instagram_manage_insights";
const SYNC_MEDIA_LIMIT: usize = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyQuery {
    company_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct MetaCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub fn create_instagram_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/meta/start", get(meta_start))
        .route("/api/auth/meta/callback", get(meta_callback))
        .route("/api/instagram/status", get(instagram_status))
        .route("/api/instagram/sync", post(sync))
        .route("/api/instagram/disconnect", post(disconnect))
        .with_state(state)
}

/// Resolve which company an Instagram operation applies to.
///
/// An admin may pass any `companyId`. A client caller is checked against
/// their own stored company (their user record is loaded fresh — the claim
/// in the token may be stale).
fn resolve_company(
    state: &AppState,
    claims: &AccessClaims,
    company_id: Option<i64>,
) -> Result<Company, ApiError> {
    let resolved = match company_id {
        Some(requested) => {
            if claims.role != Role::Admin {
                let me = state
                    .store
                    .find_user_by_id(claims.sub)?
                    .ok_or_else(|| ApiError::Unauthenticated("Not authenticated".to_string()))?;
                if me.company_id != Some(requested) {
                    return Err(ApiError::Forbidden(
                        "No permission for this company".to_string(),
                    ));
                }
            }
            requested
        }
        None => {
            let me = state
                .store
                .find_user_by_id(claims.sub)?
                .ok_or_else(|| ApiError::Unauthenticated("Not authenticated".to_string()))?;
            me.company_id.ok_or_else(|| {
                ApiError::Validation(
                    "companyId is required. Client users must belong to a company.".to_string(),
                )
            })?
        }
    };

    state
        .store
        .find_company_by_id(resolved)?
        .ok_or_else(|| ApiError::NotFound("Company not found".to_string()))
}

fn meta_client(state: &AppState) -> Result<&MetaClient, ApiError> {
    state.meta.as_ref().ok_or_else(|| {
        ApiError::Internal(anyhow::anyhow!(
            "Instagram integration not configured (META_APP_ID / META_APP_SECRET / META_CALLBACK_URL)"
        ))
    })
}

/// GET /api/auth/meta/start
///
/// Returns the Facebook authorization URL; the client performs the
/// navigation.
async fn meta_start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Value>, ApiError> {
    let claims = require_auth(&state.tokens, &headers)?;
    let company = resolve_company(&state, &claims, query.company_id)?;
    let meta = meta_client(&state)?;

    let oauth_state = state
        .tokens
        .sign_oauth_state(company.id, claims.sub)
        .map_err(|e| ApiError::Internal(e.into()))?;

    let auth_url = format!(
        "{}?client_id={}&redirect_uri={}&scope={}&state={}",
        FACEBOOK_DIALOG_URL,
        urlencoding::encode(&meta.config().app_id),
        urlencoding::encode(&meta.config().callback_url),
        urlencoding::encode(META_SCOPES),
        urlencoding::encode(&oauth_state),
    );

    info!(
        company_id = company.id,
        user_id = claims.sub,
        "Starting Instagram link flow"
    );

    Ok(Json(json!({ "authUrl": auth_url })))
}

/// GET /api/auth/meta/callback
async fn meta_callback(
    State(state): State<Arc<AppState>>,
    Query(callback): Query<MetaCallback>,
) -> Redirect {
    let frontend = &state.frontend_url;

    if let Some(error) = callback.error {
        warn!(
            error = %error,
            description = callback.error_description.as_deref().unwrap_or(""),
            "Meta authorization error"
        );
        return settings_error_redirect(frontend, &error);
    }

    let (Some(code), Some(oauth_state)) = (callback.code, callback.state) else {
        return settings_error_redirect(frontend, "missing_code_or_state");
    };

    // Fails closed: signature, expiry, and shape errors all look the same.
    let state_claims = match state.tokens.verify_oauth_state(&oauth_state) {
        Ok(claims) => claims,
        Err(_) => {
            warn!("Invalid or expired Meta OAuth state");
            return settings_error_redirect(frontend, "state_expired");
        }
    };

    let meta = match meta_client(&state) {
        Ok(meta) => meta,
        Err(_) => return settings_error_redirect(frontend, "not_configured"),
    };

    match link_instagram(&state, meta, state_claims.company_id, &code).await {
        Ok(username) => {
            info!(
                company_id = state_claims.company_id,
                username = %username,
                "Instagram account linked"
            );
            Redirect::temporary(&format!("{}/settings?instagram_connected=1", frontend))
        }
        Err(LinkFailure::NoLinkedPages) => settings_error_redirect(frontend, "no_linked_pages"),
        Err(LinkFailure::TokenExpired) => {
            settings_error_redirect(frontend, "instagram_token_expired")
        }
        Err(LinkFailure::Other(msg)) => {
            error!(company_id = state_claims.company_id, error = %msg, "Instagram link failed");
            settings_error_redirect(frontend, "link_failed")
        }
    }
}

enum LinkFailure {
    NoLinkedPages,
    TokenExpired,
    Other(String),
}

impl From<MetaError> for LinkFailure {
    fn from(e: MetaError) -> Self {
        match e {
            MetaError::TokenExpired => LinkFailure::TokenExpired,
            other => LinkFailure::Other(other.to_string()),
        }
    }
}

/// The token/resource exchange sequence, short-circuiting on the first
/// failure. Persists the connection on success and returns the username.
async fn link_instagram(
    state: &AppState,
    meta: &MetaClient,
    company_id: i64,
    code: &str,
) -> Result<String, LinkFailure> {
    let short_lived = meta.exchange_code_for_token(code).await?;
    let long_lived = meta.get_long_lived_token(&short_lived.access_token).await?;
    let pages = meta
        .get_pages_with_instagram(&long_lived.access_token)
        .await?;

    // First qualifying page wins; there is no disambiguation step.
    let Some(first) = pages.into_iter().next() else {
        return Err(LinkFailure::NoLinkedPages);
    };

    let connection = InstagramConnection {
        access_token: long_lived.access_token.clone(),
        business_account_id: first.ig_user_id,
        username: first.username.clone(),
        token_expires_at: long_lived.expires_at(),
    };
    state
        .store
        .update_company_instagram(company_id, Some(&connection))
        .map_err(|e| LinkFailure::Other(e.to_string()))?;

    Ok(first.username)
}

fn settings_error_redirect(frontend_url: &str, code: &str) -> Redirect {
    Redirect::temporary(&format!(
        "{}/settings?instagram_error={}",
        frontend_url,
        urlencoding::encode(code)
    ))
}

/// GET /api/instagram/status
///
/// Reports the connection state without ever returning the stored token.
async fn instagram_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Value>, ApiError> {
    let claims = require_auth(&state.tokens, &headers)?;
    let company = resolve_company(&state, &claims, query.company_id)?;

    let body = match company.instagram {
        Some(ig) => json!({
            "connected": true,
            "username": ig.username,
            "tokenExpiresAt": ig.token_expires_at,
        }),
        None => json!({ "connected": false }),
    };
    Ok(Json(body))
}

/// POST /api/instagram/sync
///
/// Pulls media + insights for the linked account and upserts them through
/// the store. A Graph 190 anywhere surfaces as the distinct token-expired
/// condition so the frontend can prompt a reconnect.
async fn sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Value>, ApiError> {
    let claims = require_auth(&state.tokens, &headers)?;
    let company = resolve_company(&state, &claims, query.company_id)?;
    let meta = meta_client(&state)?;

    let Some(ig) = company.instagram else {
        return Err(ApiError::Validation(
            "Instagram is not connected for this company. Connect Instagram in settings first."
                .to_string(),
        ));
    };

    let media = meta
        .get_media(&ig.business_account_id, &ig.access_token, SYNC_MEDIA_LIMIT)
        .await
        .map_err(map_meta_error)?;

    let mut posts_synced = 0usize;
    for item in media {
        let insights = meta
            .get_media_insights(&item.id, &ig.access_token)
            .await
            .map_err(map_meta_error)?;
        let post = Post {
            company_id: company.id,
            instagram_id: item.id,
            media_type: item.media_type,
            caption: item.caption,
            permalink: item.permalink,
            timestamp: item.timestamp,
            likes: item.like_count,
            comments: item.comments_count,
            saves: insights.get("saved").copied().unwrap_or(0),
            reach: insights.get("reach").copied().unwrap_or(0),
        };
        state.store.upsert_post(&post)?;
        posts_synced += 1;
    }

    let days = meta
        .get_account_insights(&ig.business_account_id, &ig.access_token, None, None)
        .await
        .map_err(map_meta_error)?;

    let mut days_synced = 0usize;
    for day in &days {
        let Ok(date) = day.date.parse() else {
            continue;
        };
        let metric = DailyMetric {
            company_id: company.id,
            date,
            followers_count: day.values.get("follower_count").copied().unwrap_or(0),
            reach: day.values.get("reach").copied().unwrap_or(0),
            impressions: day.values.get("impressions").copied().unwrap_or(0),
            profile_views: day.values.get("profile_views").copied().unwrap_or(0),
        };
        state.store.upsert_daily_metric(&metric)?;
        days_synced += 1;
    }

    info!(
        company_id = company.id,
        posts = posts_synced,
        days = days_synced,
        "Instagram sync completed"
    );

    Ok(Json(json!({
        "message": "Synced successfully",
        "posts": posts_synced,
        "days": days_synced,
    })))
}

/// POST /api/instagram/disconnect
///
/// Clears all four Instagram fields together.
async fn disconnect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Value>, ApiError> {
    let claims = require_auth(&state.tokens, &headers)?;
    let company = resolve_company(&state, &claims, query.company_id)?;

    state.store.update_company_instagram(company.id, None)?;
    info!(company_id = company.id, "Instagram disconnected");

    Ok(Json(json!({ "message": "Instagram disconnected" })))
}

fn map_meta_error(e: MetaError) -> ApiError {
    match e {
        MetaError::TokenExpired => ApiError::InstagramTokenExpired,
        MetaError::Http(msg) => ApiError::ExternalProvider(msg),
        other => ApiError::ExternalProvider(other.to_string()),
    }
}
