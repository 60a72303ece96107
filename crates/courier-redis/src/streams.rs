//! Redis Streams support (consumer groups)

use crate::{RedisClient, Result};
use redis::{AsyncCommands, Value, streams::StreamReadReply};
use std::collections::HashMap;

/// Entry in a Redis Stream (string values)
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Options for XREADGROUP
#[derive(Debug, Clone, Default)]
pub struct StreamReadOptions {
    /// Block for N milliseconds (None = no blocking)
    pub block: Option<u64>,
    /// Maximum number of entries to return
    pub count: Option<u64>,
}

impl RedisClient {
    // ============================================================================
    // Stream Operations
    // ============================================================================

    /// XADD - Add entry to stream, optionally trimming to an approximate length
    ///
    /// Returns the generated ID
    pub async fn xadd(
        &mut self,
        stream_key: &str,
        fields: &[(&str, &str)],
        max_len: Option<usize>,
    ) -> Result<String> {
        match max_len {
            Some(len) => {
                self.connection_mut()
                    .xadd_maxlen(
                        stream_key,
                        redis::streams::StreamMaxlen::Approx(len),
                        "*",
                        fields,
                    )
                    .await
            }
            None => self.connection_mut().xadd(stream_key, "*", fields).await,
        }
    }

    /// XGROUP CREATE key group start_id MKSTREAM
    ///
    /// Returns `false` when the group already exists (BUSYGROUP).
    pub async fn xgroup_create_mkstream(
        &mut self,
        stream_key: &str,
        group: &str,
        start_id: &str,
    ) -> Result<bool> {
        let result: Result<()> = self
            .connection_mut()
            .xgroup_create_mkstream(stream_key, group, start_id)
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// XREADGROUP GROUP group consumer [COUNT n] [BLOCK ms] STREAMS key id
    ///
    /// `id` is `">"` for entries never delivered to the group; any other id
    /// replays this consumer's pending entries with a greater id (`"0"` for
    /// all of them). Returns `None` when a blocking
    /// read times out with nothing to deliver.
    pub async fn xreadgroup(
        &mut self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        id: &str,
        options: StreamReadOptions,
    ) -> Result<Option<Vec<StreamEntry>>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer);

        if let Some(count) = options.count {
            cmd.arg("COUNT").arg(count);
        }
        if let Some(block_ms) = options.block {
            cmd.arg("BLOCK").arg(block_ms);
        }

        cmd.arg("STREAMS").arg(stream_key).arg(id);

        let reply: Option<StreamReadReply> = cmd.query_async(self.connection_mut()).await?;
        let Some(reply) = reply else {
            return Ok(None);
        };

        let mut entries = Vec::new();
        for stream in reply.keys {
            for stream_id in stream.ids {
                let mut fields = HashMap::new();

                for (key, value) in stream_id.map.iter() {
                    let value_str = match value {
                        Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
                        Value::SimpleString(s) => s.clone(),
                        Value::Int(i) => i.to_string(),
                        _ => {
                            tracing::debug!(
                                entry_id = %stream_id.id,
                                field = %key,
                                "Skipping non-string stream field"
                            );
                            continue;
                        }
                    };
                    fields.insert(key.clone(), value_str);
                }

                entries.push(StreamEntry {
                    id: stream_id.id,
                    fields,
                });
            }
        }

        Ok(Some(entries))
    }

    /// XACK - Acknowledge stream entries
    pub async fn xack(&mut self, stream_key: &str, group: &str, ids: &[&str]) -> Result<i64> {
        self.connection_mut().xack(stream_key, group, ids).await
    }
}
