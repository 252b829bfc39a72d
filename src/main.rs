use anyhow::{Context, Result};
use gramboard::api::{create_api_router, AppState};
use gramboard::config::{load_config, AppConfig, Secrets};
use gramboard::email::{ConsoleEmailSender, EmailSender, SmtpConfig, SmtpEmailSender};
use gramboard::meta::{MetaClient, MetaConfig};
use gramboard::store::SqliteStore;
use gramboard::token::TokenService;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gramboard=info".into()),
        )
        .init();

    let config_path =
        std::env::var("GRAMBOARD_CONFIG").unwrap_or_else(|_| "gramboard.toml".to_string());
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path, error = %e, "Config file not loaded, using defaults");
            AppConfig::default()
        }
    };

    let store = Arc::new(
        SqliteStore::new(&config.storage.db_path).context("Failed to open storage database")?,
    );

    let secrets = Secrets::from_env();
    let tokens = TokenService::new(
        secrets.access_token_secret,
        secrets.refresh_token_secret,
        secrets.oauth_state_secret,
    );

    let email: Arc<dyn EmailSender> = match SmtpConfig::from_env() {
        Some(smtp) => {
            info!(host = %smtp.host, "Using SMTP email sender");
            Arc::new(SmtpEmailSender::new(smtp).map_err(|e| anyhow::anyhow!(e))?)
        }
        None => {
            warn!("SMTP not configured, reset codes will be logged to the console");
            Arc::new(ConsoleEmailSender)
        }
    };

    let meta = MetaConfig::from_env().map(MetaClient::new);
    if meta.is_none() {
        warn!("Meta integration not configured, Instagram linking is disabled");
    }

    let app = create_api_router(AppState {
        store,
        tokens,
        email,
        meta,
        frontend_url: config.frontend.url.trim_end_matches('/').to_string(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "gramboard listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
