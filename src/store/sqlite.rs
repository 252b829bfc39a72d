//! SQLite-backed storage.
//!
//! Schema is created on open. The connection is wrapped in a mutex; every
//! operation is a single statement, so SQLite's serialized mode and
//! per-statement atomicity give us the row-level guarantees the auth core
//! relies on (notably: the four Instagram fields always change together).

use super::{
    Company, DailyMetric, InstagramConnection, NewOAuthUser, NewUser, Post, Provider,
    RefreshTokenRecord, Role, Store, User,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates or opens the database at `db_path` (use `:memory:` in tests).
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                password_hash TEXT,
                provider TEXT,
                provider_id TEXT,
                role TEXT NOT NULL,
                company_id INTEGER,
                reset_code TEXT,
                reset_code_expires_at TEXT
            );
            CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                instagram_access_token TEXT,
                instagram_business_account_id TEXT,
                instagram_username TEXT,
                instagram_token_expires_at TEXT
            );
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TEXT NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS posts (
                company_id INTEGER NOT NULL,
                instagram_id TEXT NOT NULL,
                media_type TEXT NOT NULL,
                caption TEXT,
                permalink TEXT,
                timestamp TEXT NOT NULL,
                likes INTEGER NOT NULL DEFAULT 0,
                comments INTEGER NOT NULL DEFAULT 0,
                saves INTEGER NOT NULL DEFAULT 0,
                reach INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (company_id, instagram_id)
            );
            CREATE TABLE IF NOT EXISTS daily_metrics (
                company_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                followers_count INTEGER NOT NULL DEFAULT 0,
                reach INTEGER NOT NULL DEFAULT 0,
                impressions INTEGER NOT NULL DEFAULT 0,
                profile_views INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (company_id, date)
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);
            "#,
        )
        .context("Failed to create schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
        let provider: Option<String> = row.get("provider")?;
        let role: String = row.get("role")?;
        let expires: Option<String> = row.get("reset_code_expires_at")?;
        Ok(User {
            id: row.get("id")?,
            email: row.get("email")?,
            name: row.get("name")?,
            password_hash: row.get("password_hash")?,
            provider: provider.as_deref().and_then(Provider::parse),
            provider_id: row.get("provider_id")?,
            role: Role::parse(&role).unwrap_or(Role::Client),
            company_id: row.get("company_id")?,
            reset_code: row.get("reset_code")?,
            reset_code_expires_at: expires.as_deref().and_then(parse_timestamp),
        })
    }

    fn query_user(&self, sql: &str, param: &dyn rusqlite::ToSql) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([param])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::user_from_row(row)?)),
            None => Ok(None),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Store for SqliteStore {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("SELECT * FROM users WHERE email = ?1", &email)
    }

    fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.query_user("SELECT * FROM users WHERE id = ?1", &id)
    }

    fn create_user(&self, new: NewUser) -> Result<User> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (email, name, password_hash, provider, role, company_id)
             VALUES (?1, ?2, ?3, 'local', ?4, ?5)",
            params![
                new.email,
                new.name,
                new.password_hash,
                new.role.as_str(),
                new.company_id
            ],
        )
        .context("Failed to insert user")?;
        let id = conn.last_insert_rowid();
        Ok(User {
            id,
            email: new.email,
            name: new.name,
            password_hash: Some(new.password_hash),
            provider: Some(Provider::Local),
            provider_id: None,
            role: new.role,
            company_id: new.company_id,
            reset_code: None,
            reset_code_expires_at: None,
        })
    }

    fn create_oauth_user(&self, new: NewOAuthUser) -> Result<User> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (email, name, provider, provider_id, role, company_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.email,
                new.name,
                new.provider.as_str(),
                new.provider_id,
                new.role.as_str(),
                new.company_id
            ],
        )
        .context("Failed to insert OAuth user")?;
        let id = conn.last_insert_rowid();
        Ok(User {
            id,
            email: new.email,
            name: new.name,
            password_hash: None,
            provider: Some(new.provider),
            provider_id: Some(new.provider_id),
            role: new.role,
            company_id: new.company_id,
            reset_code: None,
            reset_code_expires_at: None,
        })
    }

    fn update_user_provider(&self, id: i64, provider: Provider, provider_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE users SET provider = ?1, provider_id = ?2 WHERE id = ?3",
            params![provider.as_str(), provider_id, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("User {} not found", id));
        }
        Ok(())
    }

    fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, reset_code = NULL,
             reset_code_expires_at = NULL WHERE id = ?2",
            params![password_hash, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("User {} not found", id));
        }
        Ok(())
    }

    fn set_reset_code(&self, email: &str, code: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE users SET reset_code = ?1, reset_code_expires_at = ?2 WHERE email = ?3",
            params![code, expires_at.to_rfc3339(), email],
        )?;
        if changed == 0 {
            return Err(anyhow!("No user with email {}", email));
        }
        Ok(())
    }

    fn find_user_by_reset_code(&self, code: &str) -> Result<Option<User>> {
        self.query_user("SELECT * FROM users WHERE reset_code = ?1", &code)
    }

    fn create_company(&self, name: &str) -> Result<Company> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO companies (name) VALUES (?1)", params![name])
            .context("Failed to insert company")?;
        Ok(Company {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            instagram: None,
        })
    }

    fn find_company_by_id(&self, id: i64) -> Result<Option<Company>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM companies WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        let row = match rows.next()? {
            Some(row) => row,
            None => return Ok(None),
        };

        let token: Option<String> = row.get("instagram_access_token")?;
        let account_id: Option<String> = row.get("instagram_business_account_id")?;
        let username: Option<String> = row.get("instagram_username")?;
        let expires: Option<String> = row.get("instagram_token_expires_at")?;

        // All four fields are written together, so token presence implies
        // the rest. Treat a partial row as disconnected.
        let instagram = match (token, account_id, username) {
            (Some(access_token), Some(business_account_id), Some(username)) => {
                Some(InstagramConnection {
                    access_token,
                    business_account_id,
                    username,
                    token_expires_at: expires.as_deref().and_then(parse_timestamp),
                })
            }
            _ => None,
        };

        Ok(Some(Company {
            id: row.get("id")?,
            name: row.get("name")?,
            instagram,
        }))
    }

    fn update_company_instagram(
        &self,
        id: i64,
        connection: Option<&InstagramConnection>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = match connection {
            Some(c) => conn.execute(
                "UPDATE companies SET instagram_access_token = ?1,
                 instagram_business_account_id = ?2, instagram_username = ?3,
                 instagram_token_expires_at = ?4 WHERE id = ?5",
                params![
                    c.access_token,
                    c.business_account_id,
                    c.username,
                    c.token_expires_at.map(|t| t.to_rfc3339()),
                    id
                ],
            )?,
            None => conn.execute(
                "UPDATE companies SET instagram_access_token = NULL,
                 instagram_business_account_id = NULL, instagram_username = NULL,
                 instagram_token_expires_at = NULL WHERE id = ?1",
                params![id],
            )?,
        };
        if changed == 0 {
            return Err(anyhow!("Company {} not found", id));
        }
        Ok(())
    }

    fn create_or_update_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, revoked)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(token) DO UPDATE SET
                 user_id = excluded.user_id,
                 expires_at = excluded.expires_at,
                 revoked = 0",
            params![token, user_id, expires_at.to_rfc3339()],
        )
        .context("Failed to store refresh token")?;
        Ok(())
    }

    fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT token, user_id, expires_at, revoked FROM refresh_tokens WHERE token = ?1")?;
        let mut rows = stmt.query(params![token])?;
        match rows.next()? {
            Some(row) => {
                let expires: String = row.get("expires_at")?;
                let revoked: i64 = row.get("revoked")?;
                Ok(Some(RefreshTokenRecord {
                    token: row.get("token")?,
                    user_id: row.get("user_id")?,
                    expires_at: parse_timestamp(&expires)
                        .ok_or_else(|| anyhow!("Malformed expires_at on refresh token"))?,
                    revoked: revoked != 0,
                }))
            }
            None => Ok(None),
        }
    }

    fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE refresh_tokens SET revoked = 1 WHERE token = ?1",
            params![token],
        )?;
        Ok(())
    }

    fn upsert_post(&self, post: &Post) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO posts (company_id, instagram_id, media_type, caption,
                 permalink, timestamp, likes, comments, saves, reach)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(company_id, instagram_id) DO UPDATE SET
                 media_type = excluded.media_type,
                 caption = excluded.caption,
                 permalink = excluded.permalink,
                 timestamp = excluded.timestamp,
                 likes = excluded.likes,
                 comments = excluded.comments,
                 saves = excluded.saves,
                 reach = excluded.reach",
            params![
                post.company_id,
                post.instagram_id,
                post.media_type,
                post.caption,
                post.permalink,
                post.timestamp.to_rfc3339(),
                post.likes,
                post.comments,
                post.saves,
                post.reach
            ],
        )
        .context("Failed to upsert post")?;
        Ok(())
    }

    fn upsert_daily_metric(&self, metric: &DailyMetric) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO daily_metrics (company_id, date, followers_count, reach,
                 impressions, profile_views)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(company_id, date) DO UPDATE SET
                 followers_count = excluded.followers_count,
                 reach = excluded.reach,
                 impressions = excluded.impressions,
                 profile_views = excluded.profile_views",
            params![
                metric.company_id,
                metric.date.to_string(),
                metric.followers_count,
                metric.reach,
                metric.impressions,
                metric.profile_views
            ],
        )
        .context("Failed to upsert daily metric")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> SqliteStore {
        SqliteStore::new(":memory:").unwrap()
    }

    fn sample_user(store: &SqliteStore) -> User {
        store
            .create_user(NewUser {
                email: "a@x.com".to_string(),
                name: "Alice".to_string(),
                password_hash: "$argon2$fake".to_string(),
                role: Role::Client,
                company_id: None,
            })
            .unwrap()
    }

    #[test]
    fn test_create_and_find_user_by_email() {
        let store = store();
        let user = sample_user(&store);

        let found = store.find_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.provider, Some(Provider::Local));
        assert!(found.password_hash.is_some());

        assert!(store.find_user_by_email("missing@x.com").unwrap().is_none());
    }

    #[test]
    fn test_update_provider_preserves_password_hash() {
        let store = store();
        let user = sample_user(&store);

        store
            .update_user_provider(user.id, Provider::Google, "g-123")
            .unwrap();

        let found = store.find_user_by_id(user.id).unwrap().unwrap();
        assert_eq!(found.provider, Some(Provider::Google));
        assert_eq!(found.provider_id.as_deref(), Some("g-123"));
        assert_eq!(found.password_hash.as_deref(), Some("$argon2$fake"));
    }

    #[test]
    fn test_update_password_clears_reset_code() {
        let store = store();
        let user = sample_user(&store);
        store
            .set_reset_code("a@x.com", "123456", Utc::now() + Duration::minutes(15))
            .unwrap();
        assert!(store.find_user_by_reset_code("123456").unwrap().is_some());

        store.update_password(user.id, "$argon2$new").unwrap();

        let found = store.find_user_by_id(user.id).unwrap().unwrap();
        assert!(found.reset_code.is_none());
        assert!(found.reset_code_expires_at.is_none());
        assert!(store.find_user_by_reset_code("123456").unwrap().is_none());
    }

    #[test]
    fn test_company_instagram_fields_set_and_cleared_together() {
        let store = store();
        let company = store.create_company("Acme").unwrap();
        assert!(store
            .find_company_by_id(company.id)
            .unwrap()
            .unwrap()
            .instagram
            .is_none());

        let connection = InstagramConnection {
            access_token: "long-lived".to_string(),
            business_account_id: "ig-1".to_string(),
            username: "acme_ig".to_string(),
            token_expires_at: Some(Utc::now() + Duration::days(60)),
        };
        store
            .update_company_instagram(company.id, Some(&connection))
            .unwrap();

        let found = store.find_company_by_id(company.id).unwrap().unwrap();
        let ig = found.instagram.unwrap();
        assert_eq!(ig.username, "acme_ig");
        assert_eq!(ig.business_account_id, "ig-1");

        store.update_company_instagram(company.id, None).unwrap();
        let found = store.find_company_by_id(company.id).unwrap().unwrap();
        assert!(found.instagram.is_none());
    }

    #[test]
    fn test_refresh_token_revocation() {
        let store = store();
        let user = sample_user(&store);
        let expires = Utc::now() + Duration::days(7);

        store
            .create_or_update_refresh_token(user.id, "tok-1", expires)
            .unwrap();
        let record = store.find_refresh_token("tok-1").unwrap().unwrap();
        assert!(!record.revoked);
        assert_eq!(record.user_id, user.id);

        store.revoke_refresh_token("tok-1").unwrap();
        let record = store.find_refresh_token("tok-1").unwrap().unwrap();
        assert!(record.revoked);
    }

    #[test]
    fn test_upsert_post_is_idempotent() {
        let store = store();
        let company = store.create_company("Acme").unwrap();
        let mut post = Post {
            company_id: company.id,
            instagram_id: "media-1".to_string(),
            media_type: "IMAGE".to_string(),
            caption: Some("hello".to_string()),
            permalink: None,
            timestamp: Utc::now(),
            likes: 10,
            comments: 2,
            saves: 1,
            reach: 100,
        };
        store.upsert_post(&post).unwrap();
        post.likes = 25;
        store.upsert_post(&post).unwrap();
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            sample_user(&store);
        }

        let store = SqliteStore::new(&path).unwrap();
        assert!(store.find_user_by_email("a@x.com").unwrap().is_some());
    }
}
