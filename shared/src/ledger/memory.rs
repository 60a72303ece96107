use super::models::{EmailRequest, EmailStatus};
use super::storage::RequestLedger;
use async_trait::async_trait;
use courier_error::{AppError, AppResult};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Ledger operation that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    Create,
    Delete,
    /// An update to this particular status
    UpdateStatus(EmailStatus),
    UpdateContent,
    Find,
}

#[derive(Default)]
struct State {
    records: HashMap<String, EmailRequest>,
    /// Every status a request has been written with, in order
    history: HashMap<String, Vec<EmailStatus>>,
    failing: HashSet<LedgerOp>,
}

/// In-memory ledger with status history and failure injection.
///
/// Used by tests and by local runs without Postgres.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail with a storage error
    pub async fn fail_on(&self, op: LedgerOp) {
        self.state.lock().await.failing.insert(op);
    }

    pub async fn get(&self, request_id: &str) -> Option<EmailRequest> {
        self.state.lock().await.records.get(request_id).cloned()
    }

    pub async fn status_history(&self, request_id: &str) -> Vec<EmailStatus> {
        self.state
            .lock()
            .await
            .history
            .get(request_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn injected(op: LedgerOp) -> AppError {
    AppError::storage(format!("injected failure on {:?}", op))
}

#[async_trait]
impl RequestLedger for InMemoryLedger {
    async fn create(&self, request: &EmailRequest) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.failing.contains(&LedgerOp::Create) {
            return Err(injected(LedgerOp::Create));
        }
        if state.records.contains_key(&request.request_id) {
            return Err(AppError::DuplicateRequest(request.request_id.clone()));
        }

        state
            .records
            .insert(request.request_id.clone(), request.clone());
        state
            .history
            .insert(request.request_id.clone(), vec![request.status]);
        Ok(())
    }

    async fn delete(&self, request_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.failing.contains(&LedgerOp::Delete) {
            return Err(injected(LedgerOp::Delete));
        }
        state.records.remove(request_id);
        Ok(())
    }

    async fn update_status(&self, request_id: &str, status: EmailStatus) -> AppResult<()> {
        let op = LedgerOp::UpdateStatus(status);
        let mut state = self.state.lock().await;
        if state.failing.contains(&op) {
            return Err(injected(op));
        }

        if let Some(record) = state.records.get_mut(request_id) {
            record.status = status;
            state
                .history
                .entry(request_id.to_string())
                .or_default()
                .push(status);
        }
        Ok(())
    }

    async fn update_content(&self, request_id: &str, content: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.failing.contains(&LedgerOp::UpdateContent) {
            return Err(injected(LedgerOp::UpdateContent));
        }

        if let Some(record) = state.records.get_mut(request_id) {
            record.content = content.to_string();
        }
        Ok(())
    }

    async fn find(&self, request_id: &str) -> AppResult<Option<EmailRequest>> {
        let state = self.state.lock().await;
        if state.failing.contains(&LedgerOp::Find) {
            return Err(injected(LedgerOp::Find));
        }
        Ok(state.records.get(request_id).cloned())
    }
}
