// ============================================================================
// Database Configuration
// ============================================================================

use crate::env_or;

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl DbConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
        }
    }
}
