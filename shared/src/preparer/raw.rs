use super::{DraftMessage, PrepareStep};
use async_trait::async_trait;
use courier_error::{AppError, AppResult};

/// Builds a basic HTML MIME message with CRLF headers
pub struct RawMimeStep {
    source: String,
}

impl RawMimeStep {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[async_trait]
impl PrepareStep for RawMimeStep {
    async fn apply(&self, draft: &mut DraftMessage) -> AppResult<()> {
        if self.source.trim().is_empty() {
            return Err(AppError::preparation("source email is required"));
        }
        if draft.recipient.trim().is_empty() {
            return Err(AppError::preparation("recipient is required"));
        }
        if draft.subject.trim().is_empty() {
            return Err(AppError::preparation("subject is required"));
        }
        // Header injection
        if draft.subject.contains(['\r', '\n']) {
            return Err(AppError::preparation("subject contains invalid characters"));
        }

        let mut raw = format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\n",
            self.source, draft.recipient, draft.subject
        );
        raw.reserve(draft.content.len() + 96);
        raw.push_str("MIME-Version: 1.0\r\n");
        raw.push_str("Content-Type: text/html; charset=UTF-8\r\n");
        raw.push_str("Content-Transfer-Encoding: 7bit\r\n");
        raw.push_str("\r\n");
        raw.push_str(&draft.content);

        draft.raw = raw;
        Ok(())
    }
}
