//! Process configuration, read once at startup from the environment.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidVar(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Base URL of the design generation gateway.
    pub gateway_url: String,
    pub gateway_api_key: String,
    /// Remote transcript mirror; `None` disables mirroring.
    pub mirror_url: Option<String>,
    pub mirror_api_key: Option<String>,
    pub outbox_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let outbox_poll_secs = match std::env::var("FABRICA_OUTBOX_POLL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidVar("FABRICA_OUTBOX_POLL_SECS", e.to_string()))?,
            Err(_) => 30,
        };

        Ok(Self {
            database_url: std::env::var("FABRICA_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:fabrica.db".to_string()),
            bind_addr: std::env::var("FABRICA_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3456".to_string()),
            gateway_url: std::env::var("FABRICA_GATEWAY_URL")
                .map_err(|_| ConfigError::MissingVar("FABRICA_GATEWAY_URL"))?,
            gateway_api_key: std::env::var("FABRICA_GATEWAY_API_KEY")
                .map_err(|_| ConfigError::MissingVar("FABRICA_GATEWAY_API_KEY"))?,
            mirror_url: std::env::var("FABRICA_MIRROR_URL").ok(),
            mirror_api_key: std::env::var("FABRICA_MIRROR_API_KEY").ok(),
            outbox_poll_interval: Duration::from_secs(outbox_poll_secs),
        })
    }
}
