//! Persistent storage for users, companies, refresh tokens, and synced
//! Instagram data.
//!
//! The auth core consumes storage through the [`Store`] trait so it can be
//! tested against the in-memory implementation. Production uses the SQLite
//! implementation; every mutation is a single-row statement, so SQLite's
//! per-statement atomicity is all the transactional guarantee this module
//! needs.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// External identity provider attached to a user account.
///
/// `None` on the user row means the same thing as `Local`: the account has
/// never been linked to an external provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    Google,
    Microsoft,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Google => "google",
            Provider::Microsoft => "microsoft",
        }
    }

    pub fn parse(s: &str) -> Option<Provider> {
        match s {
            "local" => Some(Provider::Local),
            "google" => Some(Provider::Google),
            "microsoft" => Some(Provider::Microsoft),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User role. Admins may act on any company; clients only on their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "client" => Some(Role::Client),
            _ => None,
        }
    }
}

/// A user account.
///
/// `password_hash` is `None` for pure-OAuth accounts. Dual auth is allowed:
/// a user linked to Google/Microsoft may still hold a password hash and log
/// in either way.
#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub provider: Option<Provider>,
    pub provider_id: Option<String>,
    pub role: Role,
    pub company_id: Option<i64>,
    pub reset_code: Option<String>,
    pub reset_code_expires_at: Option<DateTime<Utc>>,
}

impl User {
    /// Public view of the user, safe to return from the API and to embed in
    /// OAuth redirect URLs. Never includes the password hash or reset code.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
            provider: self.provider,
            company_id: self.company_id,
        }
    }
}

/// Sanitized user representation returned by the API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub provider: Option<Provider>,
    pub company_id: Option<i64>,
}

/// Fields for creating a local (password) user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub company_id: Option<i64>,
}

/// Fields for creating a user provisioned from an external identity.
/// No password hash; provider + provider_id are set from the start.
#[derive(Clone, Debug)]
pub struct NewOAuthUser {
    pub email: String,
    pub name: String,
    pub provider: Provider,
    pub provider_id: String,
    pub role: Role,
    pub company_id: Option<i64>,
}

/// A tenant company with its Instagram connection state.
#[derive(Clone, Debug)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub instagram: Option<InstagramConnection>,
}

/// Instagram connection state for a company.
///
/// The four fields travel together: connecting sets all of them, and
/// disconnecting clears all of them in a single storage call.
#[derive(Clone, Debug, PartialEq)]
pub struct InstagramConnection {
    pub access_token: String,
    pub business_account_id: String,
    pub username: String,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// A persisted refresh token. Never deleted, only flagged revoked.
#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

/// A synced Instagram post.
#[derive(Clone, Debug)]
pub struct Post {
    pub company_id: i64,
    pub instagram_id: String,
    pub media_type: String,
    pub caption: Option<String>,
    pub permalink: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub likes: i64,
    pub comments: i64,
    pub saves: i64,
    pub reach: i64,
}

/// A synced per-day account metric row.
#[derive(Clone, Debug)]
pub struct DailyMetric {
    pub company_id: i64,
    pub date: NaiveDate,
    pub followers_count: i64,
    pub reach: i64,
    pub impressions: i64,
    pub profile_views: i64,
}

/// Storage contract consumed by the auth core and the sync endpoints.
///
/// Methods are synchronous: both implementations are cheap single-row
/// operations (SQLite behind a mutex, or a hashmap), called directly from
/// request handlers the way the credential store is used elsewhere in the
/// codebase.
pub trait Store: Send + Sync {
    // Users
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;
    fn create_user(&self, new: NewUser) -> Result<User>;
    fn create_oauth_user(&self, new: NewOAuthUser) -> Result<User>;
    /// Sets provider + provider_id, leaving the password hash untouched.
    fn update_user_provider(&self, id: i64, provider: Provider, provider_id: &str) -> Result<()>;
    /// Sets a new password hash and clears any pending reset code.
    fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;
    fn set_reset_code(&self, email: &str, code: &str, expires_at: DateTime<Utc>) -> Result<()>;
    fn find_user_by_reset_code(&self, code: &str) -> Result<Option<User>>;

    // Companies
    fn create_company(&self, name: &str) -> Result<Company>;
    fn find_company_by_id(&self, id: i64) -> Result<Option<Company>>;
    /// Sets (Some) or clears (None) all four Instagram fields together.
    fn update_company_instagram(
        &self,
        id: i64,
        connection: Option<&InstagramConnection>,
    ) -> Result<()>;

    // Refresh tokens
    fn create_or_update_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;
    fn revoke_refresh_token(&self, token: &str) -> Result<()>;

    // Synced Instagram data
    fn upsert_post(&self, post: &Post) -> Result<()>;
    fn upsert_daily_metric(&self, metric: &DailyMetric) -> Result<()>;
}
