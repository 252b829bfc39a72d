//! Google/Microsoft OAuth login endpoints.
//!
//! Both callbacks terminate in a browser redirect to the frontend: either
//! `/auth/callback` carrying the token bundle in the query string, or
//! `/login` carrying a sanitized error code. No failure on this path ever
//! surfaces as a raw error page.

use super::AppState;
use crate::oauth::{
    fetch_external_identity, get_provider_config, resolve_and_link, IdentityError,
    IdentityProvider, LinkError,
};
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub fn create_oauth_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/:provider", get(oauth_start))
        .route("/api/auth/:provider/callback", get(oauth_callback))
        .with_state(state)
}

/// GET /api/auth/:provider
///
/// Redirects the user agent to the provider's consent screen.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Redirect {
    let Some(provider) = IdentityProvider::parse(&provider) else {
        return login_error_redirect(&state.frontend_url, "unknown_provider");
    };

    let Some(config) = get_provider_config(provider) else {
        error!(provider = %provider, "OAuth provider not configured (missing env vars)");
        return login_error_redirect(&state.frontend_url, "oauth_not_configured");
    };

    debug!(provider = %provider, "Redirecting to OAuth consent screen");
    Redirect::temporary(&config.build_auth_url())
}

/// GET /api/auth/:provider/callback
///
/// Exchanges the code, resolves the local account, and redirects to the
/// frontend with the token bundle.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(callback): Query<OAuthCallback>,
) -> Redirect {
    let frontend = &state.frontend_url;

    let Some(provider) = IdentityProvider::parse(&provider) else {
        return login_error_redirect(frontend, "unknown_provider");
    };

    if let Some(error) = callback.error {
        warn!(
            provider = %provider,
            error = %error,
            description = callback.error_description.as_deref().unwrap_or(""),
            "Provider reported an authorization error"
        );
        return login_error_redirect(frontend, "oauth_failed");
    }

    let Some(code) = callback.code else {
        return login_error_redirect(frontend, "oauth_failed");
    };

    let Some(config) = get_provider_config(provider) else {
        error!(provider = %provider, "OAuth provider not configured");
        return login_error_redirect(frontend, "oauth_not_configured");
    };

    let identity = match fetch_external_identity(provider, &config, &code).await {
        Ok(identity) => identity,
        Err(IdentityError::ProfileIncomplete) => {
            warn!(provider = %provider, "Provider profile has no email");
            return login_error_redirect(frontend, "profile_incomplete");
        }
        Err(e) => {
            error!(provider = %provider, error = %e, "OAuth code exchange failed");
            return login_error_redirect(frontend, "oauth_failed");
        }
    };

    let bundle = match resolve_and_link(state.store.as_ref(), &state.tokens, &identity) {
        Ok(bundle) => bundle,
        Err(LinkError::UserNotRegistered) => {
            warn!(provider = %provider, "OAuth login for unregistered email");
            return login_error_redirect(frontend, "not_registered");
        }
        Err(LinkError::Internal(e)) => {
            error!(provider = %provider, error = %e, "Account linking failed");
            return login_error_redirect(frontend, "oauth_failed");
        }
    };

    info!(
        provider = %provider,
        user_id = bundle.user.id,
        "OAuth login successful"
    );

    let user_json = serde_json::to_string(&bundle.user).unwrap_or_else(|_| "{}".to_string());
    let url = format!(
        "{}/auth/callback?token={}&refreshToken={}&user={}",
        frontend,
        urlencoding::encode(&bundle.access_token),
        urlencoding::encode(&bundle.refresh_token),
        urlencoding::encode(&user_json),
    );

    debug!(url = %mask_token_params(&url), "Redirecting to frontend with session");
    Redirect::temporary(&url)
}

fn login_error_redirect(frontend_url: &str, code: &str) -> Redirect {
    Redirect::temporary(&format!(
        "{}/login?error={}",
        frontend_url,
        urlencoding::encode(code)
    ))
}

/// Replace token values in a redirect URL before logging it.
fn mask_token_params(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key @ ("token" | "refreshToken"), _)) => format!("{}=***", key),
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", base, masked.join("&"))
}
