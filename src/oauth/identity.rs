//! Identity adapters: exchange an authorization code for provider tokens
//! and normalize the provider's profile shape.
//!
//! Each provider returns a differently-shaped profile document; the typed
//! structs below validate and narrow those shapes at the boundary so the
//! rest of the flow only ever sees an [`ExternalIdentity`].

use super::ProviderConfig;
use crate::store::Provider;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Which external identity provider a login flow talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityProvider {
    Google,
    Microsoft,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Google => "google",
            IdentityProvider::Microsoft => "microsoft",
        }
    }

    pub fn parse(s: &str) -> Option<IdentityProvider> {
        match s {
            "google" => Some(IdentityProvider::Google),
            "microsoft" => Some(IdentityProvider::Microsoft),
            _ => None,
        }
    }

    /// The value stored on the user row once this provider is linked.
    pub fn as_store_provider(&self) -> Provider {
        match self {
            IdentityProvider::Google => Provider::Google,
            IdentityProvider::Microsoft => Provider::Microsoft,
        }
    }
}

impl std::fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized identity extracted from a provider profile.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalIdentity {
    pub provider: IdentityProvider,
    pub email: String,
    pub display_name: String,
    pub external_id: String,
}

/// Failures during code exchange or profile retrieval.
#[derive(Debug)]
pub enum IdentityError {
    /// The provider omitted the email (scope not granted, or account has
    /// none). Fatal: the user cannot be identified.
    ProfileIncomplete,
    /// The provider rejected the authorization code.
    TokenExchangeFailed(String),
    /// Transport failure or malformed response.
    Http(String),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::ProfileIncomplete => {
                write!(f, "No email address in the provider profile")
            }
            IdentityError::TokenExchangeFailed(msg) => {
                write!(f, "Authorization code exchange failed: {}", msg)
            }
            IdentityError::Http(msg) => write!(f, "Provider request failed: {}", msg),
        }
    }
}

impl std::error::Error for IdentityError {}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
}

/// Google OpenID Connect userinfo document.
#[derive(Deserialize, Debug)]
struct GoogleProfile {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
}

/// Microsoft Graph `/v1.0/me` document.
#[derive(Deserialize, Debug)]
struct MicrosoftProfile {
    id: String,
    #[serde(default)]
    mail: Option<String>,
    #[serde(rename = "userPrincipalName", default)]
    user_principal_name: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(rename = "givenName", default)]
    given_name: Option<String>,
}

/// Exchange the callback `code` and fetch the normalized identity.
pub async fn fetch_external_identity(
    provider: IdentityProvider,
    config: &ProviderConfig,
    code: &str,
) -> Result<ExternalIdentity, IdentityError> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| IdentityError::Http(e.to_string()))?;

    let access_token = exchange_code(&client, config, code).await?;
    debug!(provider = %provider, "Authorization code exchanged, fetching profile");

    let profile = client
        .get(&config.userinfo_url)
        .bearer_auth(&access_token)
        .send()
        .await
        .map_err(|e| IdentityError::Http(e.to_string()))?;

    if !profile.status().is_success() {
        return Err(IdentityError::Http(format!(
            "Profile fetch returned status {}",
            profile.status()
        )));
    }

    let body = profile
        .json::<serde_json::Value>()
        .await
        .map_err(|e| IdentityError::Http(format!("Malformed profile response: {}", e)))?;

    normalize_profile(provider, body)
}

async fn exchange_code(
    client: &reqwest::Client,
    config: &ProviderConfig,
    code: &str,
) -> Result<String, IdentityError> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("code", code);
    form.insert("redirect_uri", config.callback_url.as_str());
    form.insert("client_id", config.client_id.as_str());
    form.insert("client_secret", config.client_secret.as_str());

    let response = client
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| IdentityError::Http(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(IdentityError::TokenExchangeFailed(format!(
            "status {}: {}",
            status, body
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| IdentityError::Http(format!("Malformed token response: {}", e)))?;

    Ok(token.access_token)
}

/// Narrow a raw profile document into an [`ExternalIdentity`].
fn normalize_profile(
    provider: IdentityProvider,
    body: serde_json::Value,
) -> Result<ExternalIdentity, IdentityError> {
    match provider {
        IdentityProvider::Google => {
            let profile: GoogleProfile = serde_json::from_value(body)
                .map_err(|e| IdentityError::Http(format!("Unexpected profile shape: {}", e)))?;
            let email = profile.email.ok_or(IdentityError::ProfileIncomplete)?;
            let display_name = profile
                .name
                .or(profile.given_name)
                .unwrap_or_else(|| "User".to_string());
            Ok(ExternalIdentity {
                provider,
                email,
                display_name,
                external_id: profile.sub,
            })
        }
        IdentityProvider::Microsoft => {
            let profile: MicrosoftProfile = serde_json::from_value(body)
                .map_err(|e| IdentityError::Http(format!("Unexpected profile shape: {}", e)))?;
            // Graph reports the address in `mail` for most accounts and in
            // `userPrincipalName` for some tenant configurations.
            let email = profile
                .mail
                .or(profile.user_principal_name)
                .ok_or(IdentityError::ProfileIncomplete)?;
            let display_name = profile
                .display_name
                .or(profile.given_name)
                .unwrap_or_else(|| "User".to_string());
            Ok(ExternalIdentity {
                provider,
                email,
                display_name,
                external_id: profile.id,
            })
        }
    }
}
