//! Billing client port.
//!
//! Outbound calls to the billing provider. Results of these calls are never
//! written to subscription state directly: the provider confirms every change
//! through a webhook event, which the reconciler applies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerRef, SubscriptionRef, UserId};
use crate::domain::subscription::{SubscriptionError, SubscriptionStatus};

#[async_trait]
pub trait BillingClient: Send + Sync {
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<BillingCustomer, BillingError>;

    /// Starts a subscription; it will typically be `incomplete` until the
    /// first payment is confirmed.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, BillingError>;

    /// Moves the subscription to another price, prorated by the provider.
    async fn update_subscription_price(
        &self,
        subscription_ref: &SubscriptionRef,
        price_ref: &str,
    ) -> Result<ProviderSubscription, BillingError>;

    async fn set_cancel_at_period_end(
        &self,
        subscription_ref: &SubscriptionRef,
        cancel: bool,
    ) -> Result<ProviderSubscription, BillingError>;

    /// Ends the subscription immediately.
    async fn cancel_subscription_now(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<ProviderSubscription, BillingError>;

    async fn list_invoices(&self, customer_ref: &CustomerRef, limit: u8) -> Result<Vec<Invoice>, BillingError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Stored as provider metadata so events can be traced back.
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCustomer {
    pub customer_ref: CustomerRef,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_ref: CustomerRef,
    pub price_ref: String,
    pub trial_days: Option<u32>,
    pub coupon: Option<String>,
    pub idempotency_key: Option<String>,
}

/// The provider's immediate response to a subscription call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub subscription_ref: SubscriptionRef,
    pub customer_ref: CustomerRef,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    /// Secret the client uses to confirm the first payment, if one is pending.
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub amount_due_cents: i64,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub status: Option<String>,
    pub hosted_invoice_url: Option<String>,
    /// Unix seconds.
    pub created: i64,
}

/// Errors from billing provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingError {
    pub code: BillingErrorCode,
    pub message: String,
    /// Provider's own error code, when it sent one.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl BillingError {
    pub fn new(code: BillingErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::AuthenticationError, message)
    }

    pub fn card_declined(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::CardDeclined, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(BillingErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::InvalidRequest, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for SubscriptionError {
    fn from(err: BillingError) -> Self {
        SubscriptionError::Billing {
            message: err.to_string(),
            retryable: err.retryable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingErrorCode {
    NetworkError,
    AuthenticationError,
    CardDeclined,
    NotFound,
    RateLimitExceeded,
    InvalidRequest,
    ProviderError,
}

impl BillingErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingErrorCode::NetworkError
                | BillingErrorCode::RateLimitExceeded
                | BillingErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for BillingErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingErrorCode::NetworkError => "network_error",
            BillingErrorCode::AuthenticationError => "authentication_error",
            BillingErrorCode::CardDeclined => "card_declined",
            BillingErrorCode::NotFound => "not_found",
            BillingErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            BillingErrorCode::InvalidRequest => "invalid_request",
            BillingErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_client_is_object_safe() {
        fn _accepts_dyn(_client: &dyn BillingClient) {}
    }

    #[test]
    fn network_and_rate_limit_are_retryable() {
        assert!(BillingError::network("reset").retryable);
        assert!(BillingErrorCode::RateLimitExceeded.is_retryable());
        assert!(!BillingErrorCode::CardDeclined.is_retryable());
        assert!(!BillingErrorCode::InvalidRequest.is_retryable());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = BillingError::card_declined("Your card was declined");
        assert_eq!(err.to_string(), "card_declined: Your card was declined");
    }

    #[test]
    fn converts_into_subscription_error_keeping_retryability() {
        let err: SubscriptionError = BillingError::network("timeout").into();
        assert!(err.is_retryable());
        let err: SubscriptionError = BillingError::not_found("subscription").into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn provider_code_is_attached() {
        let err = BillingError::provider("boom").with_provider_code("api_error");
        assert_eq!(err.provider_code.as_deref(), Some("api_error"));
    }
}
