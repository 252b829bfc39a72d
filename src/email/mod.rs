//! Password-reset email delivery.
//!
//! The auth handlers treat email as fire-and-forget: the reset endpoint
//! never reports delivery failures to the client (that would leak which
//! addresses exist), so senders log and return an error only for the
//! caller to record.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::info;

/// Bound on a single SMTP delivery attempt.
const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends password-reset codes to users.
///
/// Implementations are synchronous; callers run them on a blocking task.
pub trait EmailSender: Send + Sync {
    fn send_password_reset(&self, to: &str, code: &str) -> Result<(), String>;
}

/// SMTP configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
}

impl SmtpConfig {
    /// Reads `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
    /// `SMTP_FROM_EMAIL`, and optionally `SMTP_PORT` (default 465).
    /// Returns None when any required variable is missing, in which case
    /// the server falls back to the console sender.
    pub fn from_env() -> Option<Self> {
        fn get(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.is_empty())
        }

        Some(Self {
            host: get("SMTP_HOST")?,
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(465),
            username: get("SMTP_USERNAME")?,
            password: get("SMTP_PASSWORD")?,
            from_email: get("SMTP_FROM_EMAIL")?,
        })
    }
}

/// Production sender backed by an SMTP relay.
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from_email: String,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.username, config.password);
        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| format!("Invalid SMTP relay '{}': {}", config.host, e))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(Self {
            transport,
            from_email: config.from_email,
        })
    }
}

impl EmailSender for SmtpEmailSender {
    fn send_password_reset(&self, to: &str, code: &str) -> Result<(), String> {
        let message = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e| format!("Invalid from address: {}", e))?,
            )
            .to(to
                .parse()
                .map_err(|e| format!("Invalid recipient address: {}", e))?)
            .subject("Your password reset code")
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "Your password reset code is: {}\n\nIt expires in 15 minutes. \
                 If you did not request a reset, ignore this message.",
                code
            ))
            .map_err(|e| format!("Failed to build message: {}", e))?;

        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| format!("SMTP send failed: {}", e))
    }
}

/// Development sender that logs the code instead of delivering it.
pub struct ConsoleEmailSender;

impl EmailSender for ConsoleEmailSender {
    fn send_password_reset(&self, to: &str, code: &str) -> Result<(), String> {
        info!(to = %to, code = %code, "Password reset code (console sender)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_config_missing_env_returns_none() {
        // Required variables are absent in the test environment.
        std::env::remove_var("SMTP_HOST");
        assert!(SmtpConfig::from_env().is_none());
    }

    #[test]
    fn test_console_sender_always_succeeds() {
        let sender = ConsoleEmailSender;
        assert!(sender.send_password_reset("a@x.com", "123456").is_ok());
    }
}
