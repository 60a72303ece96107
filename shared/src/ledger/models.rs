use std::fmt;

/// Lifecycle status of a request, stored as a small integer.
///
/// Gaps between codes are reserved for finer-grained states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum EmailStatus {
    New = 0,
    Processing = 1,
    Success = 10,
    TemporaryFailure = 40,
    UnknownFailure = 49,
    PermanentFailure = 50,
}

impl EmailStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(EmailStatus::New),
            1 => Some(EmailStatus::Processing),
            10 => Some(EmailStatus::Success),
            40 => Some(EmailStatus::TemporaryFailure),
            49 => Some(EmailStatus::UnknownFailure),
            50 => Some(EmailStatus::PermanentFailure),
            _ => None,
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmailStatus::New => "new",
            EmailStatus::Processing => "processing",
            EmailStatus::Success => "success",
            EmailStatus::TemporaryFailure => "temporary_failure",
            EmailStatus::UnknownFailure => "unknown_failure",
            EmailStatus::PermanentFailure => "permanent_failure",
        };
        f.write_str(name)
    }
}

/// Ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRequest {
    pub request_id: String,
    pub recipient: String,
    pub subject: String,
    /// Caller content until the pipeline overwrites it with the prepared payload
    pub content: String,
    pub status: EmailStatus,
    /// Reserved; nothing increments it yet
    pub retries: i32,
}

impl EmailRequest {
    /// A fresh request in status `New`
    pub fn new(
        request_id: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            content: content.into(),
            status: EmailStatus::New,
            retries: 0,
        }
    }
}
