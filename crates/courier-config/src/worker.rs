// ============================================================================
// Delivery Worker Configuration
// ============================================================================

use crate::constants::*;
use crate::env_or;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Consumer identity inside the group. Pending entries are attributed to
    /// this name, so a restarted worker must reuse it to recover them.
    pub consumer_name: Option<String>,
    /// Upper bound on a single pipeline run
    pub delivery_timeout_secs: u64,
    /// How often the consumer logs its counters
    pub stats_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_name: None,
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
        }
    }
}

impl WorkerConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            consumer_name: std::env::var("CONSUMER_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty()),
            delivery_timeout_secs: env_or("DELIVERY_TIMEOUT_SECS", DEFAULT_DELIVERY_TIMEOUT_SECS),
            stats_interval_secs: env_or("WORKER_STATS_INTERVAL_SECS", DEFAULT_STATS_INTERVAL_SECS),
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}
