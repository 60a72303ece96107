// ============================================================================
// Admission
// ============================================================================
//
// Records a request in the ledger, then publishes it to the delivery log. If
// the publish fails the ledger row is deleted again so no record exists
// without a queued entry.
//
// ============================================================================

use crate::delivery_log::{DeliveryLog, EmailMessage};
use crate::dto::SendRawRequest;
use crate::ledger::{EmailRequest, RequestLedger};
use courier_error::{AppError, AppResult};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AdmissionService {
    ledger: Arc<dyn RequestLedger>,
    log: Arc<dyn DeliveryLog>,
}

impl AdmissionService {
    pub fn new(ledger: Arc<dyn RequestLedger>, log: Arc<dyn DeliveryLog>) -> Self {
        Self { ledger, log }
    }

    /// Insert the ledger row in status `New`
    pub async fn create_request(&self, request: &SendRawRequest) -> AppResult<()> {
        let record = EmailRequest::new(
            &request.request_id,
            &request.recipient,
            &request.subject,
            &request.content,
        );
        self.ledger.create(&record).await
    }

    /// Compensating removal of a ledger row
    pub async fn delete_request(&self, request_id: &str) -> AppResult<()> {
        self.ledger.delete(request_id).await
    }

    /// Admit a validated request, returning the log entry id.
    pub async fn admit(&self, request: &SendRawRequest) -> AppResult<String> {
        let request_id = request.request_id.as_str();

        if let Err(e) = self.create_request(request).await {
            match &e {
                AppError::DuplicateRequest(_) => {
                    courier_metrics::EMAIL_REQUESTS_REJECTED
                        .with_label_values(&["duplicate"])
                        .inc();
                    warn!(request_id = %request_id, "Duplicate request_id");
                }
                _ => {
                    courier_metrics::EMAIL_REQUESTS_REJECTED
                        .with_label_values(&["storage"])
                        .inc();
                    error!(request_id = %request_id, error = %e, "Failed to create email history");
                }
            }
            return Err(e);
        }

        let message = EmailMessage::new(
            &request.request_id,
            &request.recipient,
            &request.subject,
            &request.content,
        );

        match self.log.publish(&message).await {
            Ok(entry_id) => {
                courier_metrics::EMAIL_REQUESTS_ACCEPTED.inc();
                info!(request_id = %request_id, entry_id = %entry_id, "Email request queued");
                Ok(entry_id)
            }
            Err(e) => {
                courier_metrics::EMAIL_REQUESTS_REJECTED
                    .with_label_values(&["queue"])
                    .inc();
                error!(request_id = %request_id, error = %e, "Failed to queue email");

                if let Err(delete_err) = self.delete_request(request_id).await {
                    error!(
                        request_id = %request_id,
                        error = %delete_err,
                        "Failed to delete email history after queue failure"
                    );
                }
                Err(e)
            }
        }
    }
}
