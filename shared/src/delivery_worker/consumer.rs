// ============================================================================
// Email Consumer Loop
// ============================================================================
//
// Reads the delivery log one entry at a time:
//
// 1. Recovery mode: replay this consumer's own pending entries, advancing the
//    cursor past each one so a failing entry is offered once per pass.
// 2. Live mode: once a recovery read comes back empty, read only new entries
//    for the rest of the loop's lifetime.
//
// An entry is acknowledged only when the pipeline run succeeds; anything else
// leaves it pending for redelivery. Per-entry failures never stop the loop.
//
// ============================================================================

use super::pipeline::DeliveryPipeline;
use crate::delivery_log::{DeliveryLog, LogEntry, ReadCursor};
use courier_config::{StreamConfig, WorkerConfig};
use courier_error::AppResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub consumer_name: String,
    /// Blocking read timeout
    pub block: Duration,
    /// Pause after a failed read
    pub error_backoff: Duration,
    pub stats_interval: Duration,
}

impl ConsumerSettings {
    pub fn new(
        consumer_name: impl Into<String>,
        stream: &StreamConfig,
        worker: &WorkerConfig,
    ) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            block: stream.block_timeout(),
            error_backoff: stream.error_backoff(),
            stats_interval: worker.stats_interval(),
        }
    }
}

/// Running totals since the consumer started
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub ack_failures: AtomicU64,
    pub read_errors: AtomicU64,
}

impl ConsumerStats {
    fn log(&self, consumer: &str) {
        info!(
            consumer = %consumer,
            delivered = self.delivered.load(Ordering::Relaxed),
            failed = self.failed.load(Ordering::Relaxed),
            ack_failures = self.ack_failures.load(Ordering::Relaxed),
            read_errors = self.read_errors.load(Ordering::Relaxed),
            "Email consumer stats"
        );
    }
}

pub struct EmailConsumer {
    log: Arc<dyn DeliveryLog>,
    pipeline: Arc<DeliveryPipeline>,
    settings: ConsumerSettings,
    stats: ConsumerStats,
}

impl EmailConsumer {
    pub fn new(
        log: Arc<dyn DeliveryLog>,
        pipeline: Arc<DeliveryPipeline>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            log,
            pipeline,
            settings,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Only a failure to create the consumer group is returned as an error.
    pub async fn run(&self, shutdown: CancellationToken) -> AppResult<()> {
        self.log.ensure_group().await?;

        let consumer = self.settings.consumer_name.as_str();
        info!(consumer = %consumer, "Email consumer started");

        let mut cursor = ReadCursor::recovery();
        let mut last_stats_log = Instant::now();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let read = tokio::select! {
                _ = shutdown.cancelled() => break,
                read = self.log.read(consumer, &cursor, self.settings.block) => read,
            };

            match read {
                Ok(entries) if entries.is_empty() => {
                    if cursor.is_recovery() {
                        info!(consumer = %consumer, "Pending entries drained; reading new entries");
                        cursor = ReadCursor::New;
                    }
                }
                Ok(entries) => {
                    for entry in entries {
                        if cursor.is_recovery() {
                            cursor = ReadCursor::Pending(entry.id.clone());
                        }
                        self.process(entry).await;
                    }
                }
                Err(e) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                    courier_metrics::STREAM_READ_ERRORS.inc();
                    error!(consumer = %consumer, error = %e, "Delivery log read failed");

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.error_backoff) => {}
                    }
                }
            }

            if last_stats_log.elapsed() >= self.settings.stats_interval {
                self.stats.log(consumer);
                last_stats_log = Instant::now();
            }
        }

        info!(consumer = %consumer, "Email consumer shutting down");
        self.stats.log(consumer);
        Ok(())
    }

    /// Run the pipeline for one entry and ack it on success
    async fn process(&self, entry: LogEntry) {
        let message = &entry.message;
        info!(
            entry_id = %entry.id,
            request_id = %message.request_id,
            "Processing email entry"
        );
        debug!(entry_id = %entry.id, recipient = %message.recipient, "Entry recipient");

        let started = Instant::now();
        let result = self
            .pipeline
            .run(
                &message.request_id,
                &message.recipient,
                &message.subject,
                &message.content,
            )
            .await;
        courier_metrics::DELIVERY_DURATION.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                courier_metrics::DELIVERIES_TOTAL
                    .with_label_values(&[outcome.as_str()])
                    .inc();

                if let Err(e) = self.log.ack(&entry.id).await {
                    self.stats.ack_failures.fetch_add(1, Ordering::Relaxed);
                    courier_metrics::ACK_FAILURES_TOTAL.inc();
                    warn!(
                        entry_id = %entry.id,
                        request_id = %message.request_id,
                        error = %e,
                        "Ack failed; entry will be redelivered"
                    );
                } else {
                    debug!(entry_id = %entry.id, outcome = outcome.as_str(), "Entry acknowledged");
                }
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                courier_metrics::DELIVERIES_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                warn!(
                    entry_id = %entry.id,
                    request_id = %message.request_id,
                    error = %e,
                    "Delivery failed; entry stays pending"
                );
            }
        }
    }
}
