//! Server configuration.
//!
//! Non-secret settings come from a TOML file; secrets (JWT secrets,
//! provider credentials, SMTP password) come from environment variables so
//! they never live in a checked-in file.

use serde::Deserialize;

/// Complete server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Where OAuth flows land the browser afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_url")]
    pub url: String,
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: default_frontend_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "gramboard.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            frontend: FrontendConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// JWT signing secrets, one per token scope.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub oauth_state_secret: String,
}

impl Secrets {
    /// Reads `ACCESS_TOKEN_SECRET`, `REFRESH_TOKEN_SECRET`, and
    /// `OAUTH_STATE_SECRET`, with development fallbacks.
    pub fn from_env() -> Self {
        fn get(key: &str, dev_default: &str) -> String {
            std::env::var(key)
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| dev_default.to_string())
        }
        Self {
            access_token_secret: get("ACCESS_TOKEN_SECRET", "dev-access-secret"),
            refresh_token_secret: get("REFRESH_TOKEN_SECRET", "dev-refresh-secret"),
            oauth_state_secret: get("OAUTH_STATE_SECRET", "dev-state-secret"),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.frontend.url, "http://localhost:3000");
        assert_eq!(config.storage.db_path, "gramboard.db");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [frontend]
            url = "https://app.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.frontend.url, "https://app.example.com");
        assert_eq!(config.server.bind_addr, "0.0.0.0:5000");
    }
}
