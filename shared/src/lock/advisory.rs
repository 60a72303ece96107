use super::Locker;
use super::held::HeldKeys;
use async_trait::async_trait;
use courier_error::LockError;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use tokio::sync::oneshot;

/// SQLSTATE raised when `lock_timeout` elapses
const LOCK_NOT_AVAILABLE: &str = "55P03";

type LockConnection = PoolConnection<Postgres>;

/// Postgres session advisory lock.
///
/// Each held key pins one pooled connection until release; the lock belongs
/// to that session, so the connection is closed rather than returned to the
/// pool afterwards. Acquire waits up to the TTL (at least one second).
pub struct PostgresAdvisoryLocker {
    pool: PgPool,
    held: HeldKeys<LockConnection>,
}

impl PostgresAdvisoryLocker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            held: HeldKeys::new(),
        }
    }
}

async fn lock_on_dedicated_connection(
    pool: &PgPool,
    key: &str,
    ttl: Duration,
) -> Result<LockConnection, LockError> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| LockError::backend(format!("acquire connection: {}", e)))?;

    let wait_secs = ttl.as_secs().max(1);
    let result = async {
        sqlx::query("SELECT set_config('lock_timeout', $1, false)")
            .bind(format!("{}s", wait_secs))
            .execute(&mut *conn)
            .await?;

        sqlx::query("SELECT pg_advisory_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *conn)
            .await
    }
    .await;

    match result {
        Ok(_) => Ok(conn),
        Err(e) => {
            // The session carries our lock_timeout; don't hand it back to the pool
            close(conn, key).await;

            match e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE) => {
                    Err(LockError::NotAcquired)
                }
                other => Err(LockError::backend(other.to_string())),
            }
        }
    }
}

async fn unlock_and_close(mut conn: LockConnection, key: &str) -> Result<(), LockError> {
    let unlocked = sqlx::query("SELECT pg_advisory_unlock(hashtextextended($1, 0))")
        .bind(key)
        .execute(&mut *conn)
        .await;

    close(conn, key).await;

    unlocked
        .map(|_| ())
        .map_err(|e| LockError::backend(format!("advisory unlock: {}", e)))
}

async fn close(conn: LockConnection, key: &str) {
    if let Err(e) = conn.close().await {
        tracing::debug!(lock_key = %key, error = %e, "Failed to close lock connection");
    }
}

#[async_trait]
impl Locker for PostgresAdvisoryLocker {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<(), LockError> {
        let reservation = self.held.reserve(key)?;

        // The wait runs on its own task: if this caller goes away mid-wait,
        // a lock obtained afterwards is undone instead of leaking a session.
        let (tx, rx) = oneshot::channel();
        let pool = self.pool.clone();
        let owned_key = key.to_string();
        tokio::spawn(async move {
            let outcome = lock_on_dedicated_connection(&pool, &owned_key, ttl).await;
            if let Err(Ok(conn)) = tx.send(outcome) {
                tracing::debug!(lock_key = %owned_key, "Acquire abandoned; unlocking");
                if let Err(e) = unlock_and_close(conn, &owned_key).await {
                    tracing::warn!(
                        lock_key = %owned_key,
                        error = %e,
                        "Failed to undo abandoned lock"
                    );
                }
            }
        });

        let conn = rx
            .await
            .map_err(|_| LockError::backend("lock task ended without a result"))??;

        reservation.fulfil(conn);
        tracing::debug!(lock_key = %key, "Advisory lock acquired");
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        match self.held.take(key) {
            Some(conn) => unlock_and_close(conn, key).await,
            None => Ok(()),
        }
    }
}
