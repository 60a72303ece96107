use super::{DeliveryLog, EmailMessage, LogEntry, ReadCursor};
use async_trait::async_trait;
use courier_error::{AppError, AppResult};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
struct LogState {
    group_created: bool,
    entries: Vec<(u64, EmailMessage)>,
    next_seq: u64,
    /// Index of the first entry not yet delivered to the group
    cursor: usize,
    /// Delivered but unacknowledged entries and their consumer
    pending: BTreeMap<u64, String>,
    acked: Vec<String>,
    fail_publish: bool,
    fail_ack: bool,
    failing_reads: usize,
}

impl LogState {
    fn entry(&self, seq: u64) -> Option<&EmailMessage> {
        self.entries
            .iter()
            .find(|(s, _)| *s == seq)
            .map(|(_, message)| message)
    }
}

fn format_id(seq: u64) -> String {
    format!("{}-0", seq)
}

fn parse_seq(id: &str) -> Option<u64> {
    id.split('-').next()?.parse().ok()
}

/// In-process delivery log with the same group semantics as the Redis one.
///
/// Supports failure injection for publish, ack and reads.
#[derive(Default)]
pub struct InMemoryDeliveryLog {
    state: Mutex<LogState>,
    appended: Notify,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_publish(&self, fail: bool) {
        self.state.lock().await.fail_publish = fail;
    }

    pub async fn fail_ack(&self, fail: bool) {
        self.state.lock().await.fail_ack = fail;
    }

    /// Fail the next `count` reads
    pub async fn fail_next_reads(&self, count: usize) {
        self.state.lock().await.failing_reads = count;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids of entries pending for `consumer`, oldest first
    pub async fn pending_for(&self, consumer: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .pending
            .iter()
            .filter(|(_, owner)| owner.as_str() == consumer)
            .map(|(seq, _)| format_id(*seq))
            .collect()
    }

    pub async fn acked(&self) -> Vec<String> {
        self.state.lock().await.acked.clone()
    }

    fn take_pending(state: &LogState, consumer: &str, after: &str) -> Vec<LogEntry> {
        let after = parse_seq(after).unwrap_or(0);
        state
            .pending
            .range(after + 1..)
            .find(|(_, owner)| owner.as_str() == consumer)
            .and_then(|(seq, _)| {
                state.entry(*seq).map(|message| LogEntry {
                    id: format_id(*seq),
                    message: message.clone(),
                })
            })
            .into_iter()
            .collect()
    }

    fn take_new(state: &mut LogState, consumer: &str) -> Option<LogEntry> {
        let (seq, message) = state.entries.get(state.cursor).cloned()?;
        state.cursor += 1;
        state.pending.insert(seq, consumer.to_string());
        Some(LogEntry {
            id: format_id(seq),
            message,
        })
    }
}

#[async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn ensure_group(&self) -> AppResult<()> {
        self.state.lock().await.group_created = true;
        Ok(())
    }

    async fn publish(&self, message: &EmailMessage) -> AppResult<String> {
        let id = {
            let mut state = self.state.lock().await;
            if state.fail_publish {
                return Err(AppError::message_queue("publish: injected failure"));
            }
            state.next_seq += 1;
            let seq = state.next_seq;
            state.entries.push((seq, message.clone()));
            format_id(seq)
        };

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read(
        &self,
        consumer: &str,
        cursor: &ReadCursor,
        block: Duration,
    ) -> AppResult<Vec<LogEntry>> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            // Register interest before checking so an append in between is not missed
            let appended = self.appended.notified();

            {
                let mut state = self.state.lock().await;
                if state.failing_reads > 0 {
                    state.failing_reads -= 1;
                    return Err(AppError::message_queue("read group: injected failure"));
                }
                if !state.group_created {
                    return Err(AppError::message_queue(
                        "read group: no such consumer group",
                    ));
                }

                match cursor {
                    ReadCursor::Pending(after) => {
                        return Ok(Self::take_pending(&state, consumer, after));
                    }
                    ReadCursor::New => {
                        if let Some(entry) = Self::take_new(&mut state, consumer) {
                            return Ok(vec![entry]);
                        }
                    }
                }
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, entry_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_ack {
            return Err(AppError::message_queue(format!(
                "ack {}: injected failure",
                entry_id
            )));
        }

        if let Some(seq) = parse_seq(entry_id) {
            if state.pending.remove(&seq).is_some() {
                state.acked.push(entry_id.to_string());
            }
        }
        Ok(())
    }
}
