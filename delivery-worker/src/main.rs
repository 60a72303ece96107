// ============================================================================
// Delivery Worker
// ============================================================================
//
// Reads email requests from the delivery log as a member of the consumer
// group, runs each through the delivery pipeline and acknowledges it once the
// ledger reflects the outcome.
//
// On start the worker first drains entries left pending for its consumer name
// by a previous run, then switches to new entries.
//
// Usage: delivery-worker [CONSUMER_NAME]
//
// ============================================================================

use anyhow::{Context, Result};
use courier_config::{Config, LockBackend};
use courier_redis::RedisClient;
use courier_shared::delivery_log::RedisStreamLog;
use courier_shared::delivery_worker::{
    ConsumerSettings, DeliveryPipeline, EmailConsumer, PipelineSettings,
};
use courier_shared::ledger::PostgresRequestLedger;
use courier_shared::lock::{Locker, PostgresAdvisoryLocker, RedisTokenStore, TokenLocker};
use courier_shared::preparer::{PreparerChain, RawMimeStep};
use courier_shared::provider;
use courier_shared::utils::mask_url;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONSUMER_NAME: &str = "email-consumer";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Delivery Worker Starting ===");

    let consumer_name = resolve_consumer_name(&config);
    info!(
        consumer = %consumer_name,
        stream = %config.stream.stream_name,
        group = %config.stream.consumer_group,
        lock_backend = ?config.lock.backend,
        "Worker configuration loaded"
    );

    info!(
        "Connecting to PostgreSQL at: {}",
        mask_url(&config.database_url)
    );
    let pool = courier_db::create_pool(&config.database_url, &config.db).await?;

    info!("Connecting to Redis at: {}", mask_url(&config.redis_url));
    // Blocking group reads occupy their connection, so the log gets its own
    let log_client = RedisClient::connect(&config.redis_url)
        .await
        .context("Failed to connect Redis for the delivery log")?;

    let locker: Arc<dyn Locker> = match config.lock.backend {
        LockBackend::Redis => {
            let lock_client = RedisClient::connect(&config.redis_url)
                .await
                .context("Failed to connect Redis for locking")?;
            Arc::new(TokenLocker::new(RedisTokenStore::new(lock_client)))
        }
        LockBackend::Postgres => Arc::new(PostgresAdvisoryLocker::new(pool.clone())),
    };

    let step = RawMimeStep::new(config.email.source_email.clone());
    let preparer = PreparerChain::new().with_step(step);

    let pipeline = Arc::new(DeliveryPipeline::new(
        Arc::new(PostgresRequestLedger::new(pool)),
        locker,
        Arc::new(preparer),
        provider::from_config(&config.email).await,
        PipelineSettings::new(&config.lock, &config.worker),
    ));

    let consumer = EmailConsumer::new(
        Arc::new(RedisStreamLog::new(log_client, &config.stream)),
        pipeline,
        ConsumerSettings::new(consumer_name, &config.stream, &config.worker),
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            info!("SIGTERM received, initiating graceful shutdown...");
                        }
                        _ = tokio::signal::ctrl_c() => {
                            info!("SIGINT received, initiating graceful shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                    tokio::signal::ctrl_c().await.ok();
                    info!("SIGINT received, initiating graceful shutdown...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, initiating graceful shutdown...");
        }
        shutdown_signal.cancel();
    });

    consumer.run(shutdown).await?;

    info!("Delivery worker stopped");
    Ok(())
}

/// First CLI argument, then CONSUMER_NAME, then the host name
fn resolve_consumer_name(config: &Config) -> String {
    std::env::args()
        .nth(1)
        .filter(|name| !name.trim().is_empty())
        .or_else(|| config.worker.consumer_name.clone())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| DEFAULT_CONSUMER_NAME.to_string())
}
