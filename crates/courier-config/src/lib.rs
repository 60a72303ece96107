// ============================================================================
// Courier Config - Centralized configuration management
// ============================================================================
//
// Configuration for the admission service and the delivery worker.
// Everything is loaded from environment variables (and an optional .env
// file) with defaults for all but the connection strings.
//
// ============================================================================

mod constants;
mod database;
mod email;
mod lock;
mod stream;
mod worker;

pub use constants::SECONDS_PER_MINUTE;
pub use database::DbConfig;
pub use email::{EmailConfig, ProviderKind};
pub use lock::{LockBackend, LockConfig};
pub use stream::StreamConfig;
pub use worker::WorkerConfig;

use anyhow::{Context, Result};
use constants::*;
use std::str::FromStr;

/// Main configuration structure shared by both binaries
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,

    pub port: u16,
    pub bind_address: String,
    pub rust_log: String,

    // Sub-configurations
    pub db: DbConfig,
    pub stream: StreamConfig,
    pub lock: LockConfig,
    pub email: EmailConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let port = env_or("PORT", DEFAULT_PORT);

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable is required")?,
            redis_url: std::env::var("REDIS_URL")
                .context("REDIS_URL environment variable is required")?,

            port,
            bind_address: format!("[::]:{}", port),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.to_string()),

            db: DbConfig::from_env(),
            stream: StreamConfig::from_env(),
            lock: LockConfig::from_env()?,
            email: EmailConfig::from_env()?,
            worker: WorkerConfig::from_env(),
        })
    }
}

/// Parse an optional environment variable, falling back to `default` when the
/// variable is unset or does not parse.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = %key, value = %raw, "Ignoring unparsable environment value");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn unset(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn set_required() {
        set("DATABASE_URL", "postgres://localhost/courier_test");
        set("REDIS_URL", "redis://127.0.0.1:6379");
        set("EMAIL_SOURCE", "noreply@example.com");
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        set_required();
        for key in [
            "PORT",
            "LOCK_BACKEND",
            "LOCK_TTL_SECS",
            "STREAM_BLOCK_MS",
            "EMAIL_STREAM_NAME",
            "EMAIL_CONSUMER_GROUP",
            "DELIVERY_TIMEOUT_SECS",
            "CONSUMER_NAME",
            "EMAIL_PROVIDER",
            "AWS_REGION",
        ] {
            unset(key);
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_address, "[::]:8080");
        assert_eq!(config.stream.stream_name, "notifications:email:send-raw");
        assert_eq!(config.stream.consumer_group, "email-consumers");
        assert_eq!(config.stream.block_ms, 5000);
        assert_eq!(config.lock.backend, LockBackend::Redis);
        assert_eq!(config.lock.key_prefix, "notifications:email:");
        assert_eq!(config.lock.ttl_secs, 120);
        assert_eq!(config.worker.delivery_timeout_secs, 30);
        assert!(config.worker.consumer_name.is_none());
        assert_eq!(config.email.provider, ProviderKind::Noop);
        assert!(config.email.aws_region.is_none());
    }

    #[test]
    #[serial]
    fn test_ses_provider_selection() {
        set_required();
        set("EMAIL_PROVIDER", "ses");
        unset("AWS_REGION");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("AWS_REGION"));

        set("AWS_REGION", "eu-west-1");
        let config = Config::from_env().unwrap();
        assert_eq!(config.email.provider, ProviderKind::Ses);
        assert_eq!(config.email.aws_region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.email.source_email, "noreply@example.com");

        set("EMAIL_PROVIDER", "carrier-pigeon");
        assert!(Config::from_env().is_err());

        unset("EMAIL_PROVIDER");
        unset("AWS_REGION");
    }

    #[test]
    #[serial]
    fn test_missing_database_url_fails() {
        set_required();
        unset("DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn test_overrides_and_bad_values() {
        set_required();
        set("LOCK_BACKEND", "postgres");
        set("STREAM_BLOCK_MS", "not-a-number");
        set("CONSUMER_NAME", "worker-7");

        let config = Config::from_env().unwrap();
        assert_eq!(config.lock.backend, LockBackend::Postgres);
        assert_eq!(config.stream.block_ms, 5000);
        assert_eq!(config.worker.consumer_name.as_deref(), Some("worker-7"));

        set("LOCK_BACKEND", "zookeeper");
        assert!(Config::from_env().is_err());

        unset("LOCK_BACKEND");
        unset("STREAM_BLOCK_MS");
        unset("CONSUMER_NAME");
    }
}
