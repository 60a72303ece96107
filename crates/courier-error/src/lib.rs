use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Outcome of a failed lock operation.
///
/// `AlreadyHeld` and `NotAcquired` are contention signals: the caller should
/// back off and let the work be redelivered. `Backend` is an I/O failure of
/// the store behind the lock.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock already held by this process")]
    AlreadyHeld,

    #[error("lock not acquired")]
    NotAcquired,

    #[error("lock backend error: {0}")]
    Backend(String),
}

impl LockError {
    /// True for `AlreadyHeld` / `NotAcquired`
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::AlreadyHeld | LockError::NotAcquired)
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        LockError::Backend(msg.into())
    }
}

/// Application error type shared by admission, the delivery pipeline and the
/// consumer loop.
///
/// Every failure cause gets its own variant so callers (and tests) can tell
/// them apart without string matching.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Caller Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate request_id: {0}")]
    DuplicateRequest(String),

    // ===== Lock Errors =====
    #[error("Acquire lock: {0}")]
    Lock(#[from] LockError),

    // ===== Database & Storage Errors =====
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Message queue error: {0}")]
    MessageQueue(String),

    // ===== Delivery Errors =====
    #[error("Prepare email content: {0}")]
    Preparation(String),

    #[error("Send failed: {0}")]
    Provider(String),

    /// A primary failure whose compensating status update also failed.
    #[error("{primary}; update status: {status_update}")]
    Compensation {
        primary: Box<AppError>,
        status_update: Box<AppError>,
    },

    #[error("Delivery timed out after {0}s")]
    Timeout(u64),

    // ===== Internal Server Errors =====
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::DuplicateRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Lock(e) if e.is_contention() => StatusCode::CONFLICT,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::DuplicateRequest(_) => "duplicate request_id".to_string(),
            AppError::Lock(_) => "Request is already being processed".to_string(),
            #[cfg(feature = "database")]
            AppError::Database(_) => "failed to create email history".to_string(),
            AppError::Storage(_) => "failed to create email history".to_string(),
            AppError::MessageQueue(_) => "failed to queue email".to_string(),
            AppError::Preparation(_) | AppError::Provider(_) | AppError::Compensation { .. } => {
                "Email delivery failed".to_string()
            }
            AppError::Timeout(_) => "Email delivery timed out".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DuplicateRequest(_) => "DUPLICATE_REQUEST",
            AppError::Lock(LockError::AlreadyHeld) => "LOCK_ALREADY_HELD",
            AppError::Lock(LockError::NotAcquired) => "LOCK_NOT_ACQUIRED",
            AppError::Lock(LockError::Backend(_)) => "LOCK_BACKEND_ERROR",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::MessageQueue(_) => "MESSAGE_QUEUE_ERROR",
            AppError::Preparation(_) => "PREPARATION_ERROR",
            AppError::Provider(_) => "PROVIDER_ERROR",
            AppError::Compensation { .. } => "COMPENSATION_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Ledger, log or lock-store I/O failure
    pub fn is_storage(&self) -> bool {
        match self {
            #[cfg(feature = "database")]
            AppError::Database(_) => true,
            AppError::Storage(_) | AppError::MessageQueue(_) => true,
            AppError::Lock(LockError::Backend(_)) => true,
            _ => false,
        }
    }

    /// True when the failure is lock contention (`AlreadyHeld` / `NotAcquired`)
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, AppError::Lock(e) if e.is_contention())
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();

        // Same flat shape the admission endpoint uses for every rejection
        let response_body = json!({
            "error": self.user_message(),
            "error_code": self.error_code(),
        });

        (status, axum::Json(response_body)).into_response()
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        AppError::Storage(msg.into())
    }

    /// Create a message queue error
    pub fn message_queue(msg: impl Into<String>) -> Self {
        AppError::MessageQueue(msg.into())
    }

    /// Create a content preparation error
    pub fn preparation(msg: impl Into<String>) -> Self {
        AppError::Preparation(msg.into())
    }

    /// Create a provider (outbound send) error
    pub fn provider(msg: impl Into<String>) -> Self {
        AppError::Provider(msg.into())
    }

    /// Create an internal server error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Combine a primary failure with a failed compensating status update
    pub fn compensation(primary: AppError, status_update: AppError) -> Self {
        AppError::Compensation {
            primary: Box::new(primary),
            status_update: Box::new(status_update),
        }
    }
}
