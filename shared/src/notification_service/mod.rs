// ============================================================================
// Notification Service - HTTP admission
// ============================================================================
//
// POST /api/v1/email/send-raw   validate, record and queue one email
// GET  /health                  liveness
// GET  /metrics                 Prometheus text format
//
// ============================================================================

pub mod handlers;

use crate::admission::AdmissionService;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for the admission handlers
pub struct NotificationServiceContext {
    pub admission: AdmissionService,
}

impl NotificationServiceContext {
    pub fn new(admission: AdmissionService) -> Self {
        Self { admission }
    }
}

pub fn router(context: Arc<NotificationServiceContext>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/email/send-raw", post(handlers::send_raw))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}
