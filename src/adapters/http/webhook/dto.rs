//! Response bodies for the webhook endpoint.

use serde::Serialize;

/// Body returned with every 2xx answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: String,
    /// `applied`, `duplicate`, `stale`, `superseded`, `ignored` or `rejected`.
    pub outcome: String,
}

impl WebhookAck {
    pub fn new(event_id: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            received: true,
            event_id: event_id.into(),
            outcome: outcome.into(),
        }
    }
}

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
