//! Ports - interfaces the application layer depends on.
//!
//! - `SubscriptionRepository` - per-user record storage with compare-and-swap writes
//! - `BillingClient` - outbound billing provider calls

mod billing_client;
mod subscription_repository;

pub use billing_client::{
    BillingClient, BillingCustomer, BillingError, BillingErrorCode, CreateCustomerRequest,
    CreateSubscriptionRequest, Invoice, ProviderSubscription,
};
pub use subscription_repository::SubscriptionRepository;
