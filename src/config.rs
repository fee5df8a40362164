//! Environment configuration.

use std::env;

use thiserror::Error;

use crate::provider::MockMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable '{0}'")]
    Missing(&'static str),
    #[error("invalid value for '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    pub payment_provider: String,
    pub mock_webhook_secret: String,
    pub mock_payment_mode: MockMode,
    pub nats_url: Option<String>,
    pub notify_subject: String,
    pub mail_from: String,
}

impl AppConfig {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let or = |name: &str, default: &str| get(name).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string());

        let database_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let db_max_connections = or("DB_MAX_CONNECTIONS", "10").parse::<u32>()
            .map_err(|e| ConfigError::Invalid { name: "DB_MAX_CONNECTIONS", reason: e.to_string() })?;
        let host = or("HOST", "0.0.0.0");
        let port = or("PORT", "8083").parse::<u16>()
            .map_err(|e| ConfigError::Invalid { name: "PORT", reason: e.to_string() })?;
        let app_base_url = or("APP_BASE_URL", &format!("http://localhost:{port}")).trim_end_matches('/').to_string();
        let payment_provider = or("PAYMENT_PROVIDER", "mock");
        if payment_provider != "mock" {
            return Err(ConfigError::Invalid { name: "PAYMENT_PROVIDER", reason: format!("unsupported provider '{payment_provider}'") });
        }
        let mock_webhook_secret = or("MOCK_WEBHOOK_SECRET", "whsec_mock_local");
        let mock_payment_mode = or("MOCK_PAYMENT_MODE", "succeeded").parse::<MockMode>()
            .map_err(|reason| ConfigError::Invalid { name: "MOCK_PAYMENT_MODE", reason })?;

        Ok(Self {
            database_url,
            db_max_connections,
            host,
            port,
            app_base_url,
            payment_provider,
            mock_webhook_secret,
            mock_payment_mode,
            nats_url: get("NATS_URL").filter(|v| !v.trim().is_empty()),
            notify_subject: or("NOTIFY_SUBJECT", "storefront.notifications.email"),
            mail_from: or("MAIL_FROM", "orders@storefront.local"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
