// ============================================================================
// Courier Shared - email delivery pipeline
// ============================================================================
//
// Domain modules shared by the admission service and the delivery worker:
//
//   ledger        durable request records and their status
//   lock          per-request mutual exclusion (advisory and token strategies)
//   delivery_log  consumer-group log the worker reads from
//   preparer      raw MIME payload construction
//   provider      outbound send capability
//   delivery_worker  pipeline state machine and consumer loop
//   admission     idempotent intake with compensation
//
// ============================================================================

pub mod admission;
pub mod delivery_log;
pub mod delivery_worker;
pub mod dto;
pub mod ledger;
pub mod lock;
pub mod notification_service;
pub mod preparer;
pub mod provider;
pub mod utils;

pub use courier_config as config;
pub use courier_db as db;
pub use courier_error as error;

/// Embedded ledger migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
