//! Request ledger
//!
//! Durable, uniquely keyed record of every send request and its lifecycle
//! status. The primary key on `request_id` is the only idempotency guard for
//! admission; status transitions are driven exclusively by the delivery
//! pipeline under the per-request lock, so this layer does no locking.

pub mod memory;
pub mod models;
pub mod storage;

pub use memory::{InMemoryLedger, LedgerOp};
pub use models::{EmailRequest, EmailStatus};
pub use storage::{PostgresRequestLedger, RequestLedger};
