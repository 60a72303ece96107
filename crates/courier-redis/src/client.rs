//! Redis client implementation with connection management

use crate::Result;
use redis::{AsyncCommands, aio::ConnectionManager};

/// Redis client with automatic reconnection
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    // ============================================================================
    // Key-Value Operations
    // ============================================================================

    /// GET - Get value by key
    pub async fn get<T: redis::FromRedisValue>(&mut self, key: &str) -> Result<Option<T>> {
        self.conn.get(key).await
    }

    /// SET key value NX PX ms
    ///
    /// Returns `true` when the key was created, `false` when it already existed.
    pub async fn set_nx_px(&mut self, key: &str, value: &str, ttl_ms: u64) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut self.conn)
            .await?;
        Ok(reply.is_some())
    }

    /// DEL - Delete one or more keys
    pub async fn del<K>(&mut self, keys: K) -> Result<i64>
    where
        K: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.del(keys).await
    }

    // ============================================================================
    // Lua Scripts
    // ============================================================================

    /// Run a script against a single key with string arguments
    pub async fn eval_script<T: redis::FromRedisValue>(
        &mut self,
        script: &redis::Script,
        key: &str,
        args: &[&str],
    ) -> Result<T> {
        let mut invocation = script.key(key);
        for arg in args {
            invocation.arg(*arg);
        }
        invocation.invoke_async(&mut self.conn).await
    }

    /// Build a script; callers keep it around so EVALSHA can be reused
    pub fn create_script(code: &str) -> redis::Script {
        redis::Script::new(code)
    }
}
