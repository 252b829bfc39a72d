//! Session issuance: mint an access/refresh token pair for an
//! authenticated user and persist the refresh token so it can be revoked.
//!
//! Every successful authentication path (password login, Google/Microsoft
//! callback) ends here.

use crate::store::{PublicUser, Store, User};
use crate::token::{TokenService, REFRESH_TOKEN_TTL_SECS};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Serialize;

/// The bundle handed back to the HTTP layer after authentication.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Mint an access + refresh token pair and persist the refresh token with
/// its 7-day expiry.
pub fn issue_session(
    store: &dyn Store,
    tokens: &TokenService,
    user: &User,
) -> Result<AuthBundle> {
    let access_token = tokens
        .issue_access_token(user.id, user.role, user.company_id)
        .context("Failed to sign access token")?;
    let refresh_token = tokens
        .issue_refresh_token(user.id)
        .context("Failed to sign refresh token")?;

    store.create_or_update_refresh_token(
        user.id,
        &refresh_token,
        Utc::now() + Duration::seconds(REFRESH_TOKEN_TTL_SECS),
    )?;

    Ok(AuthBundle {
        access_token,
        refresh_token,
        user: user.public(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewUser, Role};

    fn tokens() -> TokenService {
        TokenService::new("a".to_string(), "r".to_string(), "s".to_string())
    }

    #[test]
    fn test_issue_session_persists_refresh_token() {
        let store = MemoryStore::new();
        let tokens = tokens();
        let user = store
            .create_user(NewUser {
                email: "a@x.com".to_string(),
                name: "Alice".to_string(),
                password_hash: "h".to_string(),
                role: Role::Client,
                company_id: Some(3),
            })
            .unwrap();

        let bundle = issue_session(&store, &tokens, &user).unwrap();

        let record = store
            .find_refresh_token(&bundle.refresh_token)
            .unwrap()
            .unwrap();
        assert_eq!(record.user_id, user.id);
        assert!(!record.revoked);

        let claims = tokens.verify_access_token(&bundle.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.company_id, Some(3));

        // The bundle exposes only the sanitized user view.
        let json = serde_json::to_value(&bundle.user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["companyId"], 3);
    }
}
