//! Inbound request shapes

use courier_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const MIN_SUBJECT_CHARS: usize = 4;
const MIN_CONTENT_CHARS: usize = 11;

/// Body of `POST /api/v1/email/send-raw`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRawRequest {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
}

impl SendRawRequest {
    /// Trim surrounding whitespace from every field
    pub fn normalize(&mut self) {
        for field in [
            &mut self.request_id,
            &mut self.recipient,
            &mut self.subject,
            &mut self.content,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.request_id.is_empty()
            || self.recipient.is_empty()
            || self.subject.is_empty()
            || self.content.is_empty()
        {
            return Err(AppError::validation(
                "request_id, recipient, subject, and content are required",
            ));
        }
        if !is_valid_address(&self.recipient) {
            return Err(AppError::validation(
                "recipient must be a valid email address",
            ));
        }
        if self.subject.chars().count() < MIN_SUBJECT_CHARS {
            return Err(AppError::validation(
                "subject must be at least 4 characters",
            ));
        }
        if self.content.chars().count() < MIN_CONTENT_CHARS {
            return Err(AppError::validation(
                "content must be at least 11 characters",
            ));
        }
        Ok(())
    }
}

/// Accepts `local@domain` or `Display Name <local@domain>`
fn is_valid_address(value: &str) -> bool {
    let addr = match (value.rfind('<'), value.ends_with('>')) {
        (Some(open), true) => &value[open + 1..value.len() - 1],
        (None, false) => value,
        _ => return false,
    };

    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    if addr
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ',' | ';'))
    {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}
