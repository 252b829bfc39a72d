//! JWT issuance and verification.
//!
//! Three independently-scoped token kinds, each signed with its own secret
//! so a token minted for one scope can never verify in another:
//!
//! - **Access tokens** (15 min): identity + authorization attributes,
//!   verified statelessly on every request.
//! - **Refresh tokens** (7 days): `user_id` plus a `jti` so two tokens
//!   minted in the same second differ. Signature verification alone is not
//!   enough to trust one — the store must also confirm it is not revoked.
//! - **OAuth state tokens** (10 min): anti-CSRF correlation for the Meta
//!   linking round-trip. Self-contained, so they survive process restarts.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Role;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const OAUTH_STATE_TTL_SECS: i64 = 10 * 60;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: i64,
    pub role: Role,
    pub company_id: Option<i64>,
    pub exp: i64,
    pub iat: i64,
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: i64,
    pub jti: Uuid,
    pub exp: i64,
    pub iat: i64,
}

/// Claims carried by a Meta OAuth state token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClaims {
    pub company_id: i64,
    pub user_id: i64,
    pub exp: i64,
    pub iat: i64,
}

/// Verification failure. Callers report this as a single
/// invalid-or-expired outcome; nothing finer-grained is leaked to clients.
#[derive(Debug, PartialEq)]
pub struct InvalidToken;

impl std::fmt::Display for InvalidToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid or expired token")
    }
}

impl std::error::Error for InvalidToken {}

/// Signs and verifies the three token kinds.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    state_secret: String,
}

impl TokenService {
    pub fn new(access_secret: String, refresh_secret: String, state_secret: String) -> Self {
        Self {
            access_secret,
            refresh_secret,
            state_secret,
        }
    }

    pub fn issue_access_token(
        &self,
        user_id: i64,
        role: Role,
        company_id: Option<i64>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id,
            role,
            company_id,
            exp: now + ACCESS_TOKEN_TTL_SECS,
            iat: now,
        };
        sign(&claims, &self.access_secret)
    }

    pub fn issue_refresh_token(&self, user_id: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            exp: now + REFRESH_TOKEN_TTL_SECS,
            iat: now,
        };
        sign(&claims, &self.refresh_secret)
    }

    pub fn sign_oauth_state(
        &self,
        company_id: i64,
        user_id: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = StateClaims {
            company_id,
            user_id,
            exp: now + OAUTH_STATE_TTL_SECS,
            iat: now,
        };
        sign(&claims, &self.state_secret)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, InvalidToken> {
        verify(token, &self.access_secret)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, InvalidToken> {
        verify(token, &self.refresh_secret)
    }

    pub fn verify_oauth_state(&self, token: &str) -> Result<StateClaims, InvalidToken> {
        verify(token, &self.state_secret)
    }
}

fn sign<C: Serialize>(claims: &C, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn verify<C: DeserializeOwned>(token: &str, secret: &str) -> Result<C, InvalidToken> {
    decode::<C>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| InvalidToken)
}
