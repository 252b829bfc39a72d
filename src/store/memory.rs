//! In-memory storage, used by tests and local development.
//!
//! Mirrors the SQLite implementation's semantics exactly (upsert behavior,
//! reset-code clearing, atomic Instagram fields) so the auth core can be
//! exercised without touching disk.

use super::{
    Company, DailyMetric, InstagramConnection, NewOAuthUser, NewUser, Post, Provider,
    RefreshTokenRecord, Store, User,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    companies: Vec<Company>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    posts: HashMap<(i64, String), Post>,
    daily_metrics: HashMap<(i64, String), DailyMetric>,
    next_user_id: i64,
    next_company_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    fn create_user(&self, new: NewUser) -> Result<User> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| u.email == new.email) {
            return Err(anyhow!("Email already registered"));
        }
        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            email: new.email,
            name: new.name,
            password_hash: Some(new.password_hash),
            provider: Some(Provider::Local),
            provider_id: None,
            role: new.role,
            company_id: new.company_id,
            reset_code: None,
            reset_code_expires_at: None,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    fn create_oauth_user(&self, new: NewOAuthUser) -> Result<User> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| u.email == new.email) {
            return Err(anyhow!("Email already registered"));
        }
        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            email: new.email,
            name: new.name,
            password_hash: None,
            provider: Some(new.provider),
            provider_id: Some(new.provider_id),
            role: new.role,
            company_id: new.company_id,
            reset_code: None,
            reset_code_expires_at: None,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    fn update_user_provider(&self, id: i64, provider: Provider, provider_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| anyhow!("User {} not found", id))?;
        user.provider = Some(provider);
        user.provider_id = Some(provider_id.to_string());
        Ok(())
    }

    fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| anyhow!("User {} not found", id))?;
        user.password_hash = Some(password_hash.to_string());
        user.reset_code = None;
        user.reset_code_expires_at = None;
        Ok(())
    }

    fn set_reset_code(&self, email: &str, code: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| anyhow!("No user with email {}", email))?;
        user.reset_code = Some(code.to_string());
        user.reset_code_expires_at = Some(expires_at);
        Ok(())
    }

    fn find_user_by_reset_code(&self, code: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.reset_code.as_deref() == Some(code))
            .cloned())
    }

    fn create_company(&self, name: &str) -> Result<Company> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_company_id += 1;
        let company = Company {
            id: inner.next_company_id,
            name: name.to_string(),
            instagram: None,
        };
        inner.companies.push(company.clone());
        Ok(company)
    }

    fn find_company_by_id(&self, id: i64) -> Result<Option<Company>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.companies.iter().find(|c| c.id == id).cloned())
    }

    fn update_company_instagram(
        &self,
        id: i64,
        connection: Option<&InstagramConnection>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let company = inner
            .companies
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("Company {} not found", id))?;
        company.instagram = connection.cloned();
        Ok(())
    }

    fn create_or_update_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.refresh_tokens.insert(
            token.to_string(),
            RefreshTokenRecord {
                token: token.to_string(),
                user_id,
                expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.refresh_tokens.get(token).cloned())
    }

    fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.refresh_tokens.get_mut(token) {
            record.revoked = true;
        }
        Ok(())
    }

    fn upsert_post(&self, post: &Post) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .posts
            .insert((post.company_id, post.instagram_id.clone()), post.clone());
        Ok(())
    }

    fn upsert_daily_metric(&self, metric: &DailyMetric) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.daily_metrics.insert(
            (metric.company_id, metric.date.to_string()),
            metric.clone(),
        );
        Ok(())
    }
}
