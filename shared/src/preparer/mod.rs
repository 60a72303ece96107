//! Email content preparation
//!
//! A [`PreparerChain`] runs [`PrepareStep`]s over a [`DraftMessage`] in order
//! and yields the final raw payload.

pub mod raw;

pub use raw::RawMimeStep;

use async_trait::async_trait;
use courier_error::{AppError, AppResult};

/// Turns recipient/subject/content into the wire-format payload
#[async_trait]
pub trait Preparer: Send + Sync {
    async fn prepare(&self, recipient: &str, subject: &str, content: &str) -> AppResult<String>;
}

/// Message being assembled by a chain
#[derive(Debug, Clone, Default)]
pub struct DraftMessage {
    pub recipient: String,
    pub subject: String,
    pub content: String,
    /// Final payload; empty until some step fills it in
    pub raw: String,
}

#[async_trait]
pub trait PrepareStep: Send + Sync {
    async fn apply(&self, draft: &mut DraftMessage) -> AppResult<()>;
}

#[derive(Default)]
pub struct PreparerChain {
    steps: Vec<Box<dyn PrepareStep>>,
}

impl PreparerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl PrepareStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }
}

#[async_trait]
impl Preparer for PreparerChain {
    async fn prepare(&self, recipient: &str, subject: &str, content: &str) -> AppResult<String> {
        let mut draft = DraftMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            content: content.to_string(),
            raw: String::new(),
        };

        for step in &self.steps {
            step.apply(&mut draft).await?;
        }

        if draft.raw.is_empty() {
            return Err(AppError::preparation("prepared raw message is empty"));
        }

        Ok(draft.raw)
    }
}
