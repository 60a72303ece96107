use super::NotificationServiceContext;
use crate::dto::SendRawRequest;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use courier_error::AppError;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// POST /api/v1/email/send-raw
///
/// 200 once the request is recorded and queued. Validation failures and
/// malformed bodies and a reused request_id are 400, and storage or queue
/// failures are 500 after the ledger row has been compensated.
pub async fn send_raw(
    State(context): State<Arc<NotificationServiceContext>>,
    payload: Result<Json<SendRawRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(mut request) = payload.map_err(|rejection| {
        debug!(error = %rejection, "Rejected send-raw body");
        courier_metrics::EMAIL_REQUESTS_REJECTED
            .with_label_values(&["invalid_body"])
            .inc();
        AppError::validation("invalid request body")
    })?;

    request.normalize();
    if let Err(e) = request.validate() {
        courier_metrics::EMAIL_REQUESTS_REJECTED
            .with_label_values(&["validation"])
            .inc();
        return Err(e);
    }

    context.admission.admit(&request).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "email accepted" })),
    ))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub async fn metrics() -> Result<impl IntoResponse, AppError> {
    let body = courier_metrics::gather_metrics()
        .map_err(|e| AppError::internal(format!("gather metrics: {}", e)))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
