//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header carries `t=<unix>,v1=<hex hmac>`. The HMAC is
//! SHA-256 over `"{t}.{raw body}"` keyed with the endpoint secret. Events
//! older than five minutes, or more than a minute in the future, are refused.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::subscription::SubscriptionError;

use super::webhook_types::StripeWebhookEvent;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed event.
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// Tolerated clock skew for timestamps ahead of ours.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Errors raised while taking in a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing Stripe-Signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("timestamp out of range")]
    TimestampOutOfRange,

    #[error("timestamp in the future")]
    InvalidTimestamp,

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("test mode event rejected")]
    TestModeRejected,

    /// The event was well-formed but applying it failed.
    #[error(transparent)]
    Rejected(#[from] SubscriptionError),
}

impl WebhookError {
    /// True if the provider should redeliver.
    pub fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Rejected(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Status code returned to the provider; 5xx makes it retry.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange => StatusCode::UNAUTHORIZED,

            WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_)
            | WebhookError::TestModeRejected => StatusCode::BAD_REQUEST,

            WebhookError::Rejected(err) => match err {
                SubscriptionError::Validation(_) => StatusCode::BAD_REQUEST,
                SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
                err if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                // Redelivery cannot change the outcome.
                _ => StatusCode::OK,
            },
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Signature Header
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// All `v1` signatures; Stripe sends several while a secret is rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<signature>[,v1=...][,v0=...]`.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        if header.trim().is_empty() {
            return Err(WebhookError::MissingSignature);
        }

        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid signature header".to_string()))?;
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| WebhookError::ParseError("invalid timestamp".to_string()))?,
                    );
                }
                "v1" => {
                    let signature = hex::decode(value.trim())
                        .map_err(|_| WebhookError::ParseError("invalid v1 signature hex".to_string()))?;
                    if signature.is_empty() {
                        return Err(WebhookError::ParseError("empty v1 signature".to_string()));
                    }
                    v1_signatures.push(signature);
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Verifier
// ════════════════════════════════════════════════════════════════════════════════

pub struct StripeWebhookVerifier {
    secret: SecretString,
    require_livemode: bool,
}

impl StripeWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            require_livemode: false,
        }
    }

    /// Refuse test-mode events, for production endpoints.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    /// Verifies the signature against the current time and parses the event.
    pub fn verify_and_parse(&self, payload: &[u8], signature_header: &str) -> Result<StripeWebhookEvent, WebhookError> {
        self.verify_and_parse_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    pub fn verify_and_parse_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<StripeWebhookEvent, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        validate_timestamp(header.timestamp, now)?;

        let expected = compute_signature(self.secret.expose_secret().as_bytes(), header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate));
        if !matched {
            tracing::warn!(timestamp = header.timestamp, "webhook signature mismatch");
            return Err(WebhookError::InvalidSignature);
        }

        let event: StripeWebhookEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))?;

        if self.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "test mode webhook rejected");
            return Err(WebhookError::TestModeRejected);
        }
        Ok(event)
    }
}

fn validate_timestamp(timestamp: i64, now: i64) -> Result<(), WebhookError> {
    let age = now.saturating_sub(timestamp);
    if age > MAX_EVENT_AGE_SECS {
        tracing::warn!(timestamp, now, age_secs = age, "webhook timestamp too old");
        return Err(WebhookError::TimestampOutOfRange);
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        tracing::warn!(timestamp, now, "webhook timestamp in the future");
        return Err(WebhookError::InvalidTimestamp);
    }
    Ok(())
}

fn compute_signature(secret: &[u8], timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| WebhookError::ParseError(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Builds a valid `Stripe-Signature` header, for test clients and fixtures.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = compute_signature(secret.as_bytes(), timestamp, payload).unwrap_or_default();
    format!("t={},v1={}", timestamp, hex::encode(signature))
}
