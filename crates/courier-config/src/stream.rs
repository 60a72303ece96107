// ============================================================================
// Delivery Log (Redis Stream) Configuration
// ============================================================================

use crate::constants::*;
use crate::env_or;
use std::time::Duration;

/// Stream and consumer-group names plus read-loop timings
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Stream key entries are appended to
    pub stream_name: String,
    /// Consumer group shared by all delivery workers
    pub consumer_group: String,
    /// How long a group read blocks waiting for data (milliseconds)
    pub block_ms: u64,
    /// Pause after a failed read before trying again (milliseconds)
    pub error_backoff_ms: u64,
    /// Approximate MAXLEN applied on publish; 0 disables trimming
    pub max_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            block_ms: DEFAULT_STREAM_BLOCK_MS,
            error_backoff_ms: DEFAULT_STREAM_ERROR_BACKOFF_MS,
            max_len: 0,
        }
    }
}

impl StreamConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            stream_name: std::env::var("EMAIL_STREAM_NAME")
                .unwrap_or_else(|_| DEFAULT_STREAM_NAME.to_string()),
            consumer_group: std::env::var("EMAIL_CONSUMER_GROUP")
                .unwrap_or_else(|_| DEFAULT_CONSUMER_GROUP.to_string()),
            block_ms: env_or("STREAM_BLOCK_MS", DEFAULT_STREAM_BLOCK_MS),
            error_backoff_ms: env_or("STREAM_ERROR_BACKOFF_MS", DEFAULT_STREAM_ERROR_BACKOFF_MS),
            max_len: env_or("STREAM_MAX_LEN", 0),
        }
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
