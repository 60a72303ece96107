use super::models::{EmailRequest, EmailStatus};
use async_trait::async_trait;
use courier_error::{AppError, AppResult};
use sqlx::PgPool;

/// Storage interface for the request ledger
///
/// Implementations:
/// - PostgreSQL (production)
/// - In-memory (tests and local runs, see [`super::InMemoryLedger`])
#[async_trait]
pub trait RequestLedger: Send + Sync {
    /// Insert a new record.
    ///
    /// Fails with [`AppError::DuplicateRequest`] when the request id already
    /// exists; any other failure is a storage error.
    async fn create(&self, request: &EmailRequest) -> AppResult<()>;

    /// Remove a record. Missing rows are not an error.
    async fn delete(&self, request_id: &str) -> AppResult<()>;

    /// Unconditional status update. Missing rows are not an error.
    async fn update_status(&self, request_id: &str, status: EmailStatus) -> AppResult<()>;

    /// Overwrite the stored content with the prepared payload.
    async fn update_content(&self, request_id: &str, content: &str) -> AppResult<()>;

    async fn find(&self, request_id: &str) -> AppResult<Option<EmailRequest>>;
}

/// PostgreSQL implementation of RequestLedger
pub struct PostgresRequestLedger {
    pool: PgPool,
}

impl PostgresRequestLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestLedger for PostgresRequestLedger {
    async fn create(&self, request: &EmailRequest) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO email_requests (request_id, recipient, subject, content, status, retries)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&request.request_id)
        .bind(&request.recipient)
        .bind(&request.subject)
        .bind(&request.content)
        .bind(request.status.code())
        .bind(request.retries)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::DuplicateRequest(request.request_id.clone()))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn delete(&self, request_id: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM email_requests
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(&self, request_id: &str, status: EmailStatus) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE email_requests
            SET status = $2, updated_at = NOW()
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .bind(status.code())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_content(&self, request_id: &str, content: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE email_requests
            SET content = $2, updated_at = NOW()
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .bind(content)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, request_id: &str) -> AppResult<Option<EmailRequest>> {
        let row = sqlx::query_as::<_, (String, String, String, String, i16, i32)>(
            r#"
            SELECT request_id, recipient, subject, content, status, retries
            FROM email_requests
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(request_id, recipient, subject, content, status, retries)| {
                let status = EmailStatus::from_code(status).unwrap_or_else(|| {
                    tracing::warn!(
                        request_id = %request_id,
                        status_code = status,
                        "Unrecognised status code in ledger"
                    );
                    EmailStatus::UnknownFailure
                });
                EmailRequest {
                    request_id,
                    recipient,
                    subject,
                    content,
                    status,
                    retries,
                }
            },
        ))
    }
}
