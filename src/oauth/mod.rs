//! OAuth 2.0 login for external identity providers (Google, Microsoft).
//!
//! Authorization code flow:
//! 1. User clicks "Sign in with Google/Microsoft" in the frontend
//! 2. GET /api/auth/:provider → redirect to the provider's consent screen
//! 3. Provider redirects back to /api/auth/:provider/callback with a code
//! 4. Exchange the code, fetch and normalize the profile
//! 5. Resolve the local account, mint a session, redirect to the frontend
//!    with tokens in the query string
//!
//! The Meta/Instagram linking flow lives in [`crate::meta`] and
//! [`crate::api::instagram`]; it is resource-oriented, not identity-oriented.

mod identity;
mod linking;

pub use identity::{fetch_external_identity, ExternalIdentity, IdentityError, IdentityProvider};
pub use linking::{resolve_and_link, LinkError};

/// Endpoint set and credentials for one identity provider.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

impl ProviderConfig {
    /// Build the consent-screen URL for the authorization redirect.
    pub fn build_auth_url(&self) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&response_type=code",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.callback_url),
            urlencoding::encode(&scopes),
        )
    }
}

/// Load a provider's configuration. Client id/secret and callback URL come
/// from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` / `GOOGLE_CALLBACK_URL`
/// (resp. `MICROSOFT_*`); endpoints and scopes are fixed.
pub fn get_provider_config(provider: IdentityProvider) -> Option<ProviderConfig> {
    let prefix = match provider {
        IdentityProvider::Google => "GOOGLE",
        IdentityProvider::Microsoft => "MICROSOFT",
    };
    let client_id = std::env::var(format!("{}_CLIENT_ID", prefix)).ok()?;
    let client_secret = std::env::var(format!("{}_CLIENT_SECRET", prefix)).ok()?;
    let callback_url = std::env::var(format!("{}_CALLBACK_URL", prefix)).ok()?;

    let (auth_url, token_url, userinfo_url, scopes) = match provider {
        IdentityProvider::Google => (
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            "https://openidconnect.googleapis.com/v1/userinfo",
            vec!["profile", "email"],
        ),
        IdentityProvider::Microsoft => (
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            "https://graph.microsoft.com/v1.0/me",
            vec!["openid", "profile", "email", "https://graph.microsoft.com/User.Read"],
        ),
    };

    Some(ProviderConfig {
        auth_url: auth_url.to_string(),
        token_url: token_url.to_string(),
        userinfo_url: userinfo_url.to_string(),
        scopes: scopes.into_iter().map(|s| s.to_string()).collect(),
        client_id,
        client_secret,
        callback_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_auth_url() {
        let config = ProviderConfig {
            auth_url: "https://example.com/oauth/authorize".to_string(),
            token_url: "https://example.com/oauth/token".to_string(),
            userinfo_url: "https://example.com/userinfo".to_string(),
            scopes: vec!["profile".to_string(), "email".to_string()],
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            callback_url: "http://localhost:5000/api/auth/google/callback".to_string(),
        };

        let url = config.build_auth_url();
        assert!(url.starts_with("https://example.com/oauth/authorize?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5000%2Fapi%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("scope=profile%20email"));
        assert!(url.contains("response_type=code"));
        // The secret never appears in the browser-facing URL.
        assert!(!url.contains("secret"));
    }
}
