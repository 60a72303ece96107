//! Prometheus metrics for the email delivery pipeline
//!
//! - Admission (accepted / rejected requests)
//! - Delivery outcomes and latency
//! - Lock contention
//! - Delivery log read and ack failures

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder, opts, register_histogram,
    register_int_counter, register_int_counter_vec,
};

// ============================================================================
// Admission Metrics
// ============================================================================

/// Requests recorded in the ledger and published to the delivery log
pub static EMAIL_REQUESTS_ACCEPTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "courier_email_requests_accepted_total",
        "Email requests accepted for delivery"
    ))
    .expect("Failed to register EMAIL_REQUESTS_ACCEPTED metric")
});

/// Requests rejected at admission, by reason
pub static EMAIL_REQUESTS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "courier_email_requests_rejected_total",
            "Email requests rejected at admission"
        ),
        &["reason"]
    )
    .expect("Failed to register EMAIL_REQUESTS_REJECTED metric")
});

// ============================================================================
// Delivery Metrics
// ============================================================================

/// Pipeline runs by outcome (sent, already_delivered, orphaned, failed)
pub static DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "courier_deliveries_total",
            "Delivery pipeline runs by outcome"
        ),
        &["outcome"]
    )
    .expect("Failed to register DELIVERIES_TOTAL metric")
});

/// Wall time of a single pipeline run
pub static DELIVERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "courier_delivery_duration_seconds",
        "Histogram of delivery pipeline run times"
    )
    .expect("Failed to register DELIVERY_DURATION metric")
});

/// Lock acquisitions refused because another holder had the key
pub static LOCK_CONTENTION_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "courier_lock_contention_total",
        "Lock acquisitions refused due to contention"
    ))
    .expect("Failed to register LOCK_CONTENTION_TOTAL metric")
});

/// Entries whose acknowledgement failed after a successful run
pub static ACK_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "courier_ack_failures_total",
        "Delivery log acknowledgements that failed"
    ))
    .expect("Failed to register ACK_FAILURES_TOTAL metric")
});

/// Failed delivery log reads
pub static STREAM_READ_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "courier_stream_read_errors_total",
        "Failed reads from the delivery log"
    ))
    .expect("Failed to register STREAM_READ_ERRORS metric")
});

/// Render every registered metric in the Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
