//! Per-request distributed lock
//!
//! Two strategies sit behind one [`Locker`] interface:
//! - [`PostgresAdvisoryLocker`] waits up to the TTL for a session advisory
//!   lock held on a dedicated connection.
//! - [`TokenLocker`] does a fail-fast conditional set of a random ownership
//!   token and releases with compare-and-delete.
//!
//! Callers must not assume either blocking behaviour.

pub mod advisory;
mod held;
pub mod memory;
pub mod token;

pub use advisory::PostgresAdvisoryLocker;
pub use memory::MemoryTokenStore;
pub use token::{RedisTokenStore, TokenLocker, TokenStore};

use async_trait::async_trait;
use courier_error::LockError;
use std::sync::Arc;
use std::time::Duration;

/// Mutual exclusion keyed by an arbitrary string.
///
/// `acquire` MAY block up to `ttl` waiting for the current holder, or fail
/// immediately with [`LockError::NotAcquired`]. A second `acquire` of a key
/// this instance already holds returns [`LockError::AlreadyHeld`] without
/// contacting the backing store. Releasing a key that is not held is a no-op.
#[async_trait]
pub trait Locker: Send + Sync {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<(), LockError>;

    async fn release(&self, key: &str) -> Result<(), LockError>;
}

/// Build the lock key for a request
pub fn lock_key(prefix: &str, request_id: &str) -> String {
    format!("{}{}", prefix, request_id)
}

/// A held lock.
///
/// Release happens on a spawned task, so cancelling the future that holds
/// the guard cannot interrupt it. A guard dropped without an explicit
/// [`LockGuard::release`] (e.g. the run was timed out) releases in the
/// background.
pub struct LockGuard {
    locker: Arc<dyn Locker>,
    key: String,
    released: bool,
}

impl LockGuard {
    pub async fn acquire(
        locker: Arc<dyn Locker>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, LockError> {
        let key = key.into();
        locker.acquire(&key, ttl).await?;

        Ok(Self {
            locker,
            key,
            released: false,
        })
    }

    /// Release the lock and wait for the outcome
    pub async fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        let locker = self.locker.clone();
        let key = self.key.clone();

        match tokio::spawn(async move { locker.release(&key).await }).await {
            Ok(result) => result,
            Err(e) => Err(LockError::backend(format!("release task failed: {}", e))),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let locker = self.locker.clone();
        let key = std::mem::take(&mut self.key);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = locker.release(&key).await {
                        tracing::warn!(
                            lock_key = %key,
                            error = %e,
                            "Background lock release failed"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    lock_key = %key,
                    "No runtime to release lock; it will expire by TTL"
                );
            }
        }
    }
}
