//! Meta Graph API client (Facebook/Instagram).
//!
//! Covers the Instagram linking sequence (code → short-lived token →
//! long-lived token → pages with linked Instagram Business accounts) and
//! the read operations used by sync (media, media insights, account
//! insights).
//!
//! Graph error code 190 means the access token is expired or invalid; it is
//! mapped to a distinct [`MetaError::TokenExpired`] everywhere because the
//! frontend reacts to it with a "reconnect Instagram" action.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const GRAPH_VERSION: &str = "v18.0";
const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Graph error code for an expired or invalid access token.
const ERROR_CODE_TOKEN_INVALID: i64 = 190;
/// Graph error code for an unavailable metric (returned for some media types).
const ERROR_CODE_METRIC_UNAVAILABLE: i64 = 100;

/// Meta app credentials and the registered OAuth callback URL.
#[derive(Debug, Clone)]
pub struct MetaConfig {
    pub app_id: String,
    pub app_secret: String,
    pub callback_url: String,
}

impl MetaConfig {
    /// Reads `META_APP_ID`, `META_APP_SECRET`, `META_CALLBACK_URL`.
    /// Returns None when any is missing; the linking endpoints then report
    /// the integration as not configured.
    pub fn from_env() -> Option<Self> {
        fn get(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.is_empty())
        }
        Some(Self {
            app_id: get("META_APP_ID")?,
            app_secret: get("META_APP_SECRET")?,
            callback_url: get("META_CALLBACK_URL")?,
        })
    }
}

/// Errors from the Graph API.
#[derive(Debug)]
pub enum MetaError {
    /// Access token expired or invalid (error code 190). Actionable: the
    /// user must reconnect Instagram.
    TokenExpired,
    /// The code-for-token exchange was rejected by the provider.
    TokenExchangeFailed(String),
    /// Any other provider-reported error. Never forwarded verbatim to
    /// untrusted clients.
    Provider(String),
    /// Transport-level failure (timeout, DNS, connection refused).
    Http(String),
}

impl std::fmt::Display for MetaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaError::TokenExpired => write!(f, "Instagram token expired or invalid"),
            MetaError::TokenExchangeFailed(msg) => write!(f, "Token exchange failed: {}", msg),
            MetaError::Provider(msg) => write!(f, "Graph API error: {}", msg),
            MetaError::Http(msg) => write!(f, "Graph API request failed: {}", msg),
        }
    }
}

impl std::error::Error for MetaError {}

/// A short- or long-lived access token returned by the token endpoints.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub access_token: String,
    /// Lifetime in seconds; the long-lived grant reports ~60 days.
    pub expires_in: Option<i64>,
}

impl TokenExchange {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
    }
}

/// A Facebook Page with a linked Instagram Business account.
#[derive(Debug, Clone, PartialEq)]
pub struct PageWithInstagram {
    pub page_id: String,
    pub ig_user_id: String,
    pub username: String,
}

/// One Instagram media item.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub id: String,
    pub media_type: String,
    pub permalink: Option<String>,
    pub caption: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub like_count: i64,
    pub comments_count: i64,
}

/// One day of account-level insight values, keyed by metric name.
#[derive(Debug, Clone)]
pub struct DailyInsight {
    pub date: String,
    pub values: HashMap<String, i64>,
}

// ---- Wire types -----------------------------------------------------------

#[derive(Deserialize, Debug)]
struct GraphError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TokenEndpointResponse {
    #[serde(default)]
    error: Option<GraphError>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct LinkedInstagramAccount {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PageEntry {
    id: String,
    #[serde(default)]
    instagram_business_account: Option<LinkedInstagramAccount>,
}

#[derive(Deserialize, Debug, Default)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AccountsResponse {
    #[serde(default)]
    error: Option<GraphError>,
    #[serde(default)]
    data: Vec<PageEntry>,
    #[serde(default)]
    paging: Paging,
}

#[derive(Deserialize, Debug)]
struct MediaEntry {
    id: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    timestamp: String,
    #[serde(default)]
    like_count: Option<i64>,
    #[serde(default)]
    comments_count: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct MediaResponse {
    #[serde(default)]
    error: Option<GraphError>,
    #[serde(default)]
    data: Vec<MediaEntry>,
}

#[derive(Deserialize, Debug)]
struct InsightValue {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    end_time: Option<String>,
}

#[derive(Deserialize, Debug)]
struct InsightEntry {
    name: String,
    #[serde(default)]
    values: Vec<InsightValue>,
}

#[derive(Deserialize, Debug)]
struct InsightsResponse {
    #[serde(default)]
    error: Option<GraphError>,
    #[serde(default)]
    data: Vec<InsightEntry>,
}

// ---------------------------------------------------------------------------

/// Graph API client. Cheap to clone; the reqwest client is shared.
#[derive(Clone)]
pub struct MetaClient {
    http: reqwest::Client,
    config: MetaConfig,
    base_url: String,
}

impl MetaClient {
    pub fn new(config: MetaConfig) -> Self {
        Self::with_base_url(config, DEFAULT_BASE_URL.to_string())
    }

    /// Point the client at a different Graph host (tests use a local mock).
    pub fn with_base_url(config: MetaConfig, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            config,
            base_url,
        }
    }

    pub fn config(&self) -> &MetaConfig {
        &self.config
    }

    fn graph_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, GRAPH_VERSION, path)
    }

    /// Exchange the OAuth callback `code` for a short-lived access token.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenExchange, MetaError> {
        let url = format!(
            "{}?client_id={}&redirect_uri={}&client_secret={}&code={}",
            self.graph_url("oauth/access_token"),
            urlencoding::encode(&self.config.app_id),
            urlencoding::encode(&self.config.callback_url),
            urlencoding::encode(&self.config.app_secret),
            urlencoding::encode(code),
        );

        debug!("Exchanging Meta authorization code for short-lived token");
        let body = self.get_json::<TokenEndpointResponse>(&url).await?;
        token_from_response(body).map_err(MetaError::TokenExchangeFailed)
    }

    /// Exchange a short-lived token for a long-lived one (~60 days).
    pub async fn get_long_lived_token(
        &self,
        short_lived_token: &str,
    ) -> Result<TokenExchange, MetaError> {
        let url = format!(
            "{}?grant_type=fb_exchange_token&client_id={}&client_secret={}&fb_exchange_token={}",
            self.graph_url("oauth/access_token"),
            urlencoding::encode(&self.config.app_id),
            urlencoding::encode(&self.config.app_secret),
            urlencoding::encode(short_lived_token),
        );

        debug!("Exchanging short-lived Meta token for long-lived token");
        let body = self.get_json::<TokenEndpointResponse>(&url).await?;
        token_from_response(body).map_err(MetaError::TokenExchangeFailed)
    }

    /// List the caller's Facebook Pages that have a linked Instagram
    /// Business account, following `paging.next` until exhausted.
    ///
    /// An empty result is a business outcome, not an error: the user has no
    /// Page with Instagram linked yet.
    pub async fn get_pages_with_instagram(
        &self,
        access_token: &str,
    ) -> Result<Vec<PageWithInstagram>, MetaError> {
        let mut results = Vec::new();
        let mut next_url = Some(format!(
            "{}?fields=id,name,instagram_business_account{{id,username}}&access_token={}",
            self.graph_url("me/accounts"),
            urlencoding::encode(access_token),
        ));

        while let Some(url) = next_url {
            let body = self.get_json::<AccountsResponse>(&url).await?;
            if let Some(error) = body.error {
                return Err(classify_graph_error(error));
            }
            results.extend(filter_linked_pages(body.data));
            next_url = body.paging.next;
        }

        if results.is_empty() {
            warn!("No Facebook Page with a linked Instagram Business account was found");
        }

        Ok(results)
    }

    /// Fetch recent media for an Instagram Business account.
    pub async fn get_media(
        &self,
        ig_user_id: &str,
        access_token: &str,
        limit: usize,
    ) -> Result<Vec<MediaItem>, MetaError> {
        let url = format!(
            "{}?fields=id,media_type,permalink,caption,timestamp,like_count,comments_count&limit={}&access_token={}",
            self.graph_url(&format!("{}/media", ig_user_id)),
            limit,
            urlencoding::encode(access_token),
        );

        let body = self.get_json::<MediaResponse>(&url).await?;
        if let Some(error) = body.error {
            return Err(classify_graph_error(error));
        }

        Ok(body
            .data
            .into_iter()
            .map(|m| MediaItem {
                id: m.id,
                media_type: m.media_type.unwrap_or_else(|| "IMAGE".to_string()),
                permalink: m.permalink,
                caption: m.caption,
                timestamp: parse_graph_timestamp(&m.timestamp).unwrap_or_else(Utc::now),
                like_count: m.like_count.unwrap_or(0),
                comments_count: m.comments_count.unwrap_or(0),
            })
            .collect())
    }

    /// Fetch per-post insight metrics (engagement, reach, saved).
    ///
    /// Error code 100 means the metric set is unavailable for this media
    /// type; that yields an empty map rather than a failure.
    pub async fn get_media_insights(
        &self,
        media_id: &str,
        access_token: &str,
    ) -> Result<HashMap<String, i64>, MetaError> {
        let url = format!(
            "{}?metric=engagement,reach,saved&access_token={}",
            self.graph_url(&format!("{}/insights", media_id)),
            urlencoding::encode(access_token),
        );

        let body = self.get_json::<InsightsResponse>(&url).await?;
        if let Some(error) = body.error {
            if error.code == Some(ERROR_CODE_METRIC_UNAVAILABLE) {
                return Ok(HashMap::new());
            }
            return Err(classify_graph_error(error));
        }

        let mut metrics = HashMap::new();
        for entry in body.data {
            let value = entry
                .values
                .first()
                .and_then(|v| v.value.as_ref())
                .map(coerce_metric_value)
                .unwrap_or(0);
            metrics.insert(entry.name, value);
        }
        Ok(metrics)
    }

    /// Fetch daily account-level insights, aggregated per date.
    pub async fn get_account_insights(
        &self,
        ig_user_id: &str,
        access_token: &str,
        since: Option<i64>,
        until: Option<i64>,
    ) -> Result<Vec<DailyInsight>, MetaError> {
        let mut url = format!(
            "{}?metric=impressions,reach,follower_count,profile_views&period=day&access_token={}",
            self.graph_url(&format!("{}/insights", ig_user_id)),
            urlencoding::encode(access_token),
        );
        if let Some(since) = since {
            url.push_str(&format!("&since={}", since));
        }
        if let Some(until) = until {
            url.push_str(&format!("&until={}", until));
        }

        let body = self.get_json::<InsightsResponse>(&url).await?;
        if let Some(error) = body.error {
            return Err(classify_graph_error(error));
        }

        // The API returns one entry per metric, each with values per day;
        // pivot into one row per date.
        let mut by_date: HashMap<String, HashMap<String, i64>> = HashMap::new();
        for entry in body.data {
            for v in entry.values {
                let Some(end_time) = v.end_time else { continue };
                let date = end_time
                    .split('T')
                    .next()
                    .unwrap_or(end_time.as_str())
                    .to_string();
                let value = v.value.as_ref().map(coerce_metric_value).unwrap_or(0);
                by_date.entry(date).or_default().insert(entry.name.clone(), value);
            }
        }

        let mut days: Vec<DailyInsight> = by_date
            .into_iter()
            .map(|(date, values)| DailyInsight { date, values })
            .collect();
        days.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(days)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, MetaError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MetaError::Http(e.to_string()))?;
        response
            .json::<T>()
            .await
            .map_err(|e| MetaError::Http(format!("Malformed Graph response: {}", e)))
    }
}

fn token_from_response(body: TokenEndpointResponse) -> Result<TokenExchange, String> {
    if let Some(error) = body.error {
        return Err(error
            .message
            .unwrap_or_else(|| "Provider rejected the request".to_string()));
    }
    let access_token = body
        .access_token
        .ok_or_else(|| "No access_token in provider response".to_string())?;
    Ok(TokenExchange {
        access_token,
        expires_in: body.expires_in,
    })
}

fn classify_graph_error(error: GraphError) -> MetaError {
    if error.code == Some(ERROR_CODE_TOKEN_INVALID) {
        return MetaError::TokenExpired;
    }
    MetaError::Provider(
        error
            .message
            .unwrap_or_else(|| "Unknown Graph API error".to_string()),
    )
}

/// Keep only pages whose linked Instagram account has both id and username.
fn filter_linked_pages(pages: Vec<PageEntry>) -> Vec<PageWithInstagram> {
    pages
        .into_iter()
        .filter_map(|page| {
            let ig = page.instagram_business_account?;
            match (ig.id, ig.username) {
                (Some(ig_user_id), Some(username)) => Some(PageWithInstagram {
                    page_id: page.id,
                    ig_user_id,
                    username,
                }),
                _ => None,
            }
        })
        .collect()
}

/// Graph timestamps use a compact offset ("+0000") that RFC 3339 parsing
/// rejects; try both forms.
fn parse_graph_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Insight values are usually numbers but occasionally arrive as strings.
fn coerce_metric_value(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
