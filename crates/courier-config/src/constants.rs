// ============================================================================
// Configuration Constants
// ============================================================================

// Default port values
pub(crate) const DEFAULT_PORT: u16 = 8080;

pub(crate) const DEFAULT_RUST_LOG: &str = "info";

// Delivery log (Redis Stream) defaults
pub(crate) const DEFAULT_STREAM_NAME: &str = "notifications:email:send-raw";
pub(crate) const DEFAULT_CONSUMER_GROUP: &str = "email-consumers";
pub(crate) const DEFAULT_STREAM_BLOCK_MS: u64 = 5_000;
pub(crate) const DEFAULT_STREAM_ERROR_BACKOFF_MS: u64 = 1_000;

// Lock defaults
pub(crate) const DEFAULT_LOCK_KEY_PREFIX: &str = "notifications:email:";
pub(crate) const DEFAULT_LOCK_TTL_SECS: u64 = 2 * SECONDS_PER_MINUTE;

// Worker defaults
pub(crate) const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_STATS_INTERVAL_SECS: u64 = 30;

// Time conversion constants
pub const SECONDS_PER_MINUTE: u64 = 60;
