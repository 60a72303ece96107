//! Delivery log
//!
//! Append-only log with consumer-group semantics. Each entry is handed to one
//! consumer of the group at a time and stays pending for that consumer until
//! acknowledged. The log only triggers work; the ledger is authoritative.

pub mod memory;
pub mod redis_streams;

pub use memory::InMemoryDeliveryLog;
pub use redis_streams::RedisStreamLog;

use async_trait::async_trait;
use courier_error::AppResult;
use std::collections::HashMap;
use std::time::Duration;

/// Flat field set carried by every log entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmailMessage {
    pub request_id: String,
    pub recipient: String,
    pub subject: String,
    pub content: String,
}

impl EmailMessage {
    pub fn new(
        request_id: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            content: content.into(),
        }
    }

    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("request_id", self.request_id.as_str()),
            ("recipient", self.recipient.as_str()),
            ("subject", self.subject.as_str()),
            ("content", self.content.as_str()),
        ]
    }

    /// Missing fields decode as empty strings; the pipeline rejects them.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let get = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Self {
            request_id: get("request_id"),
            recipient: get("recipient"),
            subject: get("subject"),
            content: get("content"),
        }
    }
}

/// An entry delivered to a consumer
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log-assigned id, used for acknowledgement
    pub id: String,
    pub message: EmailMessage,
}

/// Where a group read starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadCursor {
    /// This consumer's unacknowledged entries with an id after the given one
    Pending(String),
    /// Entries never delivered to the group
    New,
}

impl ReadCursor {
    /// Start of this consumer's pending history
    pub fn recovery() -> Self {
        ReadCursor::Pending("0".to_string())
    }

    pub fn is_recovery(&self) -> bool {
        matches!(self, ReadCursor::Pending(_))
    }

    /// Stream id argument for the read
    pub fn start_id(&self) -> &str {
        match self {
            ReadCursor::Pending(after) => after,
            ReadCursor::New => ">",
        }
    }
}

#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Create the log and the consumer group if missing. An existing group is
    /// not an error.
    async fn ensure_group(&self) -> AppResult<()>;

    /// Append an entry, returning its id
    async fn publish(&self, message: &EmailMessage) -> AppResult<String>;

    /// Read at most one entry for `consumer`.
    ///
    /// Live reads block up to `block` waiting for data. An empty result means
    /// nothing was available (timeout or drained pending set).
    async fn read(
        &self,
        consumer: &str,
        cursor: &ReadCursor,
        block: Duration,
    ) -> AppResult<Vec<LogEntry>>;

    /// Remove an entry from its consumer's pending set
    async fn ack(&self, entry_id: &str) -> AppResult<()>;
}
