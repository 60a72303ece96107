use super::token::TokenStore;
use async_trait::async_trait;
use courier_error::LockError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// In-memory [`TokenStore`] honouring expiry.
///
/// Clones share state, so several `TokenLocker`s built from clones behave
/// like independent processes contending on one store.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an unexpired entry exists for `key`
    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        matches!(entries.get(key), Some((_, expires_at)) if *expires_at > Instant::now())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }

        entries.insert(key.to_string(), (token.to_string(), now + ttl));
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stored, expires_at)) if stored == token && *expires_at > Instant::now() => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
