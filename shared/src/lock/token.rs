use async_trait::async_trait;
use courier_error::LockError;
use courier_redis::RedisClient;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use super::Locker;
use super::held::HeldKeys;

/// Delete the key only while it still holds our token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Key-value store operations the token lock needs
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Set `key` to `token` with expiry if absent. `false` when already present.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration)
    -> Result<bool, LockError>;

    /// Delete `key` only if it still maps to `token`. `false` when it did not.
    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool, LockError>;
}

/// Random 128-bit ownership token, hex encoded
fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Token-based lock over any [`TokenStore`]. Never blocks on acquire.
pub struct TokenLocker<S> {
    store: Arc<S>,
    /// Ownership token per key held by this instance
    held: HeldKeys<String>,
}

impl<S: TokenStore + 'static> TokenLocker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            held: HeldKeys::new(),
        }
    }
}

#[async_trait]
impl<S: TokenStore + 'static> Locker for TokenLocker<S> {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<(), LockError> {
        let reservation = self.held.reserve(key)?;
        let token = new_token();

        // The set runs on its own task: if this caller goes away before the
        // reply, a token that landed anyway is deleted instead of blocking
        // redeliveries until the TTL.
        let (tx, rx) = oneshot::channel();
        let store = self.store.clone();
        let owned_key = key.to_string();
        let owned_token = token.clone();
        tokio::spawn(async move {
            let outcome = store.set_if_absent(&owned_key, &owned_token, ttl).await;
            if let Err(Ok(true)) = tx.send(outcome) {
                tracing::debug!(lock_key = %owned_key, "Acquire abandoned; deleting token");
                if let Err(e) = store.delete_if_equals(&owned_key, &owned_token).await {
                    tracing::warn!(
                        lock_key = %owned_key,
                        error = %e,
                        "Failed to undo abandoned lock"
                    );
                }
            }
        });

        let acquired = rx
            .await
            .map_err(|_| LockError::backend("lock task ended without a result"))??;
        if !acquired {
            return Err(LockError::NotAcquired);
        }

        reservation.fulfil(token);
        tracing::debug!(lock_key = %key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        let Some(token) = self.held.take(key) else {
            return Ok(());
        };

        let deleted = self.store.delete_if_equals(key, &token).await?;
        if !deleted {
            tracing::debug!(lock_key = %key, "Lock expired before release");
        }
        Ok(())
    }
}

/// Redis-backed token store: `SET NX PX` plus a compare-and-delete script
pub struct RedisTokenStore {
    client: RedisClient,
    release_script: redis::Script,
}

impl RedisTokenStore {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            release_script: RedisClient::create_script(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let mut client = self.client.clone();
        client
            .set_nx_px(key, token, ttl_ms)
            .await
            .map_err(|e| LockError::backend(e.to_string()))
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut client = self.client.clone();
        let deleted: i64 = client
            .eval_script(&self.release_script, key, &[token])
            .await
            .map_err(|e| LockError::backend(e.to_string()))?;
        Ok(deleted == 1)
    }
}
