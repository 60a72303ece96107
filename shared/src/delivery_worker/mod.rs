// ============================================================================
// Delivery Worker
// ============================================================================
//
// pipeline - one request: lock, status transitions, prepare, send
// consumer - the read/process/ack loop over the delivery log
//
// ============================================================================

pub mod consumer;
pub mod pipeline;

pub use consumer::{ConsumerSettings, ConsumerStats, EmailConsumer};
pub use pipeline::{DeliveryPipeline, PipelineSettings, RunOutcome};
