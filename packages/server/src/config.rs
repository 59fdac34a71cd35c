use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::kernel::jobs::manager::DisconnectPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_model: String,

    /// Requests admitted per caller per rate-limit window.
    pub rate_limit: u32,
    pub rate_limit_period: Duration,

    pub idempotency_header: String,
    pub idempotency_ttl_hours: i64,

    pub heartbeat_interval: Duration,
    pub provider_timeout: Duration,
    pub provider_max_attempts: u32,
    pub provider_backoff: Duration,
    pub disconnect_policy: DisconnectPolicy,

    /// How long settled jobs stay queryable before eviction.
    pub retention_hours: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            rate_limit: env::var("RATE_LIMIT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("RATE_LIMIT must be a valid number")?,
            rate_limit_period: Duration::from_secs(
                env::var("RATE_LIMIT_PERIOD_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("RATE_LIMIT_PERIOD_SECS must be a valid number")?,
            ),
            idempotency_header: env::var("IDEMPOTENCY_HEADER")
                .unwrap_or_else(|_| "idempotency-key".to_string())
                .to_ascii_lowercase(),
            idempotency_ttl_hours: env::var("IDEMPOTENCY_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("IDEMPOTENCY_TTL_HOURS must be a valid number")?,
            heartbeat_interval: Duration::from_secs(
                env::var("HEARTBEAT_INTERVAL_SECS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .context("HEARTBEAT_INTERVAL_SECS must be a valid number")?,
            ),
            provider_timeout: Duration::from_secs(
                env::var("PROVIDER_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("PROVIDER_TIMEOUT_SECS must be a valid number")?,
            ),
            provider_max_attempts: env::var("PROVIDER_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("PROVIDER_MAX_ATTEMPTS must be a valid number")?,
            provider_backoff: Duration::from_millis(
                env::var("PROVIDER_BACKOFF_MS")
                    .unwrap_or_else(|_| "250".to_string())
                    .parse()
                    .context("PROVIDER_BACKOFF_MS must be a valid number")?,
            ),
            disconnect_policy: match env::var("DISCONNECT_POLICY")
                .unwrap_or_else(|_| "cancel_queued".to_string())
                .as_str()
            {
                "ignore" => DisconnectPolicy::Ignore,
                "cancel_queued" => DisconnectPolicy::CancelQueued,
                other => anyhow::bail!(
                    "DISCONNECT_POLICY must be 'ignore' or 'cancel_queued', got '{other}'"
                ),
            },
            retention_hours: env::var("RETENTION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("RETENTION_HOURS must be a valid number")?,
        })
    }
}
