//! Billing webhook HTTP adapter.
//!
//! The only inbound HTTP surface: the provider posts signed events here.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, WebhookAck};
pub use handlers::{handle_billing_webhook, WebhookApiError, WebhookAppState};
pub use routes::{webhook_router, WEBHOOK_PATH};
