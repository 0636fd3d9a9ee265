//! Adapters - Implementations of port interfaces.
//!
//! - `memory` - in-process repository for tests and local runs
//! - `postgres` - PostgreSQL repository
//! - `stripe` - Stripe billing client, webhook verification and event mapping
//! - `http` - axum webhook endpoint

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;

pub use memory::InMemorySubscriptionRepository;
pub use postgres::PostgresSubscriptionRepository;
pub use stripe::{MockBillingClient, StripeBillingClient, StripeConfig, StripeWebhookVerifier};
