//! Stripe billing adapter.
//!
//! Implements the `BillingClient` port against the Stripe REST API and turns
//! signed webhook deliveries into billing event snapshots.
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps older than five minutes are rejected
//! - API keys and signing secrets are held as `secrecy::SecretString`

mod event_mapper;
mod mock_billing_client;
mod stripe_client;
mod webhook_types;
mod webhook_verifier;

pub use event_mapper::{event_kind, to_snapshot};
pub use mock_billing_client::{MethodCall, MockBillingClient};
pub use stripe_client::{StripeBillingClient, StripeConfig, DEFAULT_API_BASE_URL};
pub use webhook_types::{
    StripeCustomer, StripeInvoice, StripeList, StripeSubscription, StripeWebhookEvent,
};
pub use webhook_verifier::{
    sign_payload, SignatureHeader, StripeWebhookVerifier, WebhookError, MAX_CLOCK_SKEW_SECS,
    MAX_EVENT_AGE_SECS,
};
