//! HTTP handler for provider webhooks.
//!
//! Verification happens before anything is parsed. The response status tells
//! the provider whether to redeliver: 2xx stops retries, 5xx asks for them.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::adapters::stripe::{to_snapshot, StripeWebhookVerifier, WebhookError};
use crate::application::{ApplyBillingEventCommand, ApplyBillingEventHandler, EventDisposition};

use super::dto::{ErrorResponse, WebhookAck};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct WebhookAppState {
    pub verifier: Arc<StripeWebhookVerifier>,
    pub handler: Arc<ApplyBillingEventHandler>,
}

impl WebhookAppState {
    pub fn new(verifier: StripeWebhookVerifier, handler: ApplyBillingEventHandler) -> Self {
        Self {
            verifier: Arc::new(verifier),
            handler: Arc::new(handler),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handler
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/billing
pub async fn handle_billing_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WebhookApiError::new(None, WebhookError::MissingSignature))?;

    let event = state
        .verifier
        .verify_and_parse(&body, signature)
        .map_err(|e| WebhookApiError::new(None, e))?;

    let snapshot = match to_snapshot(&event).map_err(|e| WebhookApiError::new(Some(event.id.clone()), e))? {
        Some(snapshot) => snapshot,
        None => {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "unhandled webhook event type");
            return Ok(Json(WebhookAck::new(event.id, "ignored")));
        }
    };

    let result = state
        .handler
        .handle(ApplyBillingEventCommand { snapshot })
        .await
        .map_err(|e| WebhookApiError::new(Some(event.id.clone()), WebhookError::Rejected(e)))?;

    let outcome = match result.disposition {
        EventDisposition::Applied(_) => "applied",
        EventDisposition::DuplicatePayment => "duplicate",
        EventDisposition::Stale { .. } => "stale",
        EventDisposition::Superseded => "superseded",
    };

    Ok(Json(WebhookAck::new(event.id, outcome)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Converts webhook failures to HTTP responses.
#[derive(Debug)]
pub struct WebhookApiError {
    event_id: Option<String>,
    error: WebhookError,
}

impl WebhookApiError {
    pub fn new(event_id: Option<String>, error: WebhookError) -> Self {
        Self { event_id, error }
    }

    pub fn error(&self) -> &WebhookError {
        &self.error
    }

    fn error_code(&self) -> &'static str {
        match &self.error {
            WebhookError::MissingSignature => "MISSING_SIGNATURE",
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::TimestampOutOfRange | WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
            WebhookError::ParseError(_) | WebhookError::MissingField(_) => "INVALID_PAYLOAD",
            WebhookError::TestModeRejected => "TEST_MODE_REJECTED",
            WebhookError::Rejected(_) if self.error.is_retryable() => "TEMPORARILY_UNAVAILABLE",
            WebhookError::Rejected(_) => "EVENT_REJECTED",
        }
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();

        if status.is_server_error() {
            tracing::error!(event_id = ?self.event_id, error = %self.error, "webhook failed, provider will retry");
        } else {
            tracing::warn!(event_id = ?self.event_id, error = %self.error, status = status.as_u16(), "webhook refused");
        }

        if status == StatusCode::OK {
            let ack = WebhookAck::new(self.event_id.unwrap_or_default(), "rejected");
            return (status, Json(ack)).into_response();
        }

        let body = ErrorResponse::new(self.error_code(), self.error.to_string());
        (status, Json(body)).into_response()
    }
}
