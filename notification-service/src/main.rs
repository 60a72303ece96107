// ============================================================================
// Notification Service
// ============================================================================
//
// HTTP admission for one-shot emails. Each request is recorded in the ledger
// and queued on the delivery log. The delivery worker does the sending.
//
// ============================================================================

use anyhow::{Context, Result};
use courier_config::Config;
use courier_redis::RedisClient;
use courier_shared::admission::AdmissionService;
use courier_shared::delivery_log::{DeliveryLog, RedisStreamLog};
use courier_shared::ledger::PostgresRequestLedger;
use courier_shared::notification_service::{NotificationServiceContext, router};
use courier_shared::utils::mask_url;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Notification Service Starting ===");

    info!(
        "Connecting to PostgreSQL at: {}",
        mask_url(&config.database_url)
    );
    let pool = courier_db::create_pool(&config.database_url, &config.db).await?;

    info!("Applying database migrations...");
    courier_shared::MIGRATOR
        .run(&pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied");

    info!("Connecting to Redis at: {}", mask_url(&config.redis_url));
    let redis = RedisClient::connect(&config.redis_url).await?;

    let log = Arc::new(RedisStreamLog::new(redis, &config.stream));
    // Creates the stream too, so the worker can join a group that already exists
    log.ensure_group().await?;

    let admission = AdmissionService::new(Arc::new(PostgresRequestLedger::new(pool)), log);
    let context = Arc::new(NotificationServiceContext::new(admission));
    let app = router(context);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind REST server")?;
    info!("REST API listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start REST server")?;

    info!("Notification service stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("SIGTERM received, shutting down..."),
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down..."),
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
