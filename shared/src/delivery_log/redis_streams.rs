use super::{DeliveryLog, EmailMessage, LogEntry, ReadCursor};
use async_trait::async_trait;
use courier_config::StreamConfig;
use courier_error::{AppError, AppResult};
use courier_redis::{RedisClient, StreamReadOptions};
use std::time::Duration;

/// Delivery log on a Redis Stream with one consumer group.
///
/// Group reads block the connection they run on, so a worker should give
/// this log its own client rather than share one with the lock store.
pub struct RedisStreamLog {
    client: RedisClient,
    stream_name: String,
    consumer_group: String,
    max_len: Option<usize>,
}

impl RedisStreamLog {
    pub fn new(client: RedisClient, config: &StreamConfig) -> Self {
        Self {
            client,
            stream_name: config.stream_name.clone(),
            consumer_group: config.consumer_group.clone(),
            max_len: (config.max_len > 0).then_some(config.max_len),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

#[async_trait]
impl DeliveryLog for RedisStreamLog {
    async fn ensure_group(&self) -> AppResult<()> {
        let mut client = self.client.clone();
        let created = client
            .xgroup_create_mkstream(&self.stream_name, &self.consumer_group, "0")
            .await
            .map_err(|e| AppError::message_queue(format!("create consumer group: {}", e)))?;

        if created {
            tracing::info!(
                stream = %self.stream_name,
                group = %self.consumer_group,
                "Created consumer group"
            );
        }
        Ok(())
    }

    async fn publish(&self, message: &EmailMessage) -> AppResult<String> {
        let mut client = self.client.clone();
        let id = client
            .xadd(&self.stream_name, &message.fields(), self.max_len)
            .await
            .map_err(|e| AppError::message_queue(format!("publish: {}", e)))?;

        tracing::debug!(
            stream = %self.stream_name,
            entry_id = %id,
            request_id = %message.request_id,
            "Published email entry"
        );
        Ok(id)
    }

    async fn read(
        &self,
        consumer: &str,
        cursor: &ReadCursor,
        block: Duration,
    ) -> AppResult<Vec<LogEntry>> {
        let mut client = self.client.clone();
        let options = StreamReadOptions {
            block: Some(block.as_millis() as u64),
            count: Some(1),
        };

        let entries = client
            .xreadgroup(
                &self.stream_name,
                &self.consumer_group,
                consumer,
                cursor.start_id(),
                options,
            )
            .await
            .map_err(|e| AppError::message_queue(format!("read group: {}", e)))?
            .unwrap_or_default();

        Ok(entries
            .into_iter()
            .map(|entry| LogEntry {
                message: EmailMessage::from_fields(&entry.fields),
                id: entry.id,
            })
            .collect())
    }

    async fn ack(&self, entry_id: &str) -> AppResult<()> {
        let mut client = self.client.clone();
        client
            .xack(&self.stream_name, &self.consumer_group, &[entry_id])
            .await
            .map_err(|e| AppError::message_queue(format!("ack {}: {}", entry_id, e)))?;
        Ok(())
    }
}
