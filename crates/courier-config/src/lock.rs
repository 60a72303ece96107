// ============================================================================
// Distributed Lock Configuration
// ============================================================================

use crate::constants::*;
use crate::env_or;
use std::time::Duration;

/// Which store backs the per-request lock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockBackend {
    /// SET NX PX token lock in Redis (fail-fast)
    Redis,
    /// Postgres advisory lock on a dedicated connection (blocks up to the TTL)
    Postgres,
}

impl LockBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "redis" => Some(LockBackend::Redis),
            "postgres" | "postgresql" | "pg" => Some(LockBackend::Postgres),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LockConfig {
    pub backend: LockBackend,
    /// Namespace prepended to the request id to form the lock key
    pub key_prefix: String,
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::Redis,
            key_prefix: DEFAULT_LOCK_KEY_PREFIX.to_string(),
            ttl_secs: DEFAULT_LOCK_TTL_SECS,
        }
    }
}

impl LockConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let backend = match std::env::var("LOCK_BACKEND") {
            Ok(value) => LockBackend::parse(&value).ok_or_else(|| {
                anyhow::anyhow!(
                    "LOCK_BACKEND must be 'redis' or 'postgres', got '{}'",
                    value
                )
            })?,
            Err(_) => LockBackend::Redis,
        };

        Ok(Self {
            backend,
            key_prefix: std::env::var("LOCK_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_LOCK_KEY_PREFIX.to_string()),
            ttl_secs: env_or("LOCK_TTL_SECS", DEFAULT_LOCK_TTL_SECS),
        })
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
