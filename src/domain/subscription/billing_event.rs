//! Normalized billing events handed to the reconciler.
//!
//! Snapshots are already signature-verified and carry the provider's full
//! view of the subscription, so applying one is a field copy rather than a
//! diff.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{CustomerRef, PaymentId, SubscriptionRef, Timestamp, ValidationError};

use super::{Discount, PaymentOutcome, SubscriptionError, SubscriptionStatus};

/// Monotonic ordering key for subscription-state events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventVersion(i64);

impl EventVersion {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_newer_than(&self, other: &EventVersion) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for EventVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    PaymentSucceeded,
    PaymentFailed,
}

impl BillingEventKind {
    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            BillingEventKind::PaymentSucceeded | BillingEventKind::PaymentFailed
        )
    }

    pub fn payment_outcome(&self) -> Option<PaymentOutcome> {
        match self {
            BillingEventKind::PaymentSucceeded => Some(PaymentOutcome::Succeeded),
            BillingEventKind::PaymentFailed => Some(PaymentOutcome::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventKind::SubscriptionCreated => "subscription_created",
            BillingEventKind::SubscriptionUpdated => "subscription_updated",
            BillingEventKind::SubscriptionDeleted => "subscription_deleted",
            BillingEventKind::PaymentSucceeded => "payment_succeeded",
            BillingEventKind::PaymentFailed => "payment_failed",
        }
    }
}

impl fmt::Display for BillingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub payment_id: PaymentId,
    pub amount_cents: i64,
    pub currency: String,
    pub occurred_at: Timestamp,
}

/// The provider's view of a subscription at the moment an event fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingEventSnapshot {
    /// Provider event id, for logging.
    pub event_id: String,
    pub kind: BillingEventKind,
    pub customer_ref: Option<CustomerRef>,
    pub subscription_ref: Option<SubscriptionRef>,
    pub status: Option<SubscriptionStatus>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub price_ref: Option<String>,
    pub discount: Option<Discount>,
    pub payment: Option<PaymentDetails>,
    pub version: EventVersion,
}

impl BillingEventSnapshot {
    /// Checks the snapshot can be applied, before any storage is touched.
    ///
    /// Malformed values are a validation error. Missing required fields are
    /// `IncompleteEvent` so the provider redelivers.
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.customer_ref.is_none() && self.subscription_ref.is_none() {
            return Err(ValidationError::empty_field("subscription_ref").into());
        }

        match self.kind {
            BillingEventKind::SubscriptionCreated | BillingEventKind::SubscriptionUpdated => {
                self.require_subscription_ref()?;
                if self.status.is_none() {
                    return Err(SubscriptionError::IncompleteEvent("status"));
                }
                let start = self
                    .current_period_start
                    .ok_or(SubscriptionError::IncompleteEvent("current_period_start"))?;
                let end = self
                    .current_period_end
                    .ok_or(SubscriptionError::IncompleteEvent("current_period_end"))?;
                if end.is_before(&start) {
                    return Err(ValidationError::invalid_format(
                        "current_period_end",
                        "period ends before it starts",
                    )
                    .into());
                }
                match self.price_ref.as_deref() {
                    None => return Err(SubscriptionError::IncompleteEvent("price_ref")),
                    Some(price) if price.trim().is_empty() => {
                        return Err(ValidationError::empty_field("price_ref").into())
                    }
                    Some(_) => {}
                }
            }
            BillingEventKind::SubscriptionDeleted => {
                self.require_subscription_ref()?;
            }
            BillingEventKind::PaymentSucceeded | BillingEventKind::PaymentFailed => {
                let payment = self
                    .payment
                    .as_ref()
                    .ok_or(SubscriptionError::IncompleteEvent("payment"))?;
                if payment.amount_cents < 0 {
                    return Err(ValidationError::out_of_range(
                        "amount_cents",
                        0,
                        i64::MAX,
                        payment.amount_cents,
                    )
                    .into());
                }
                if payment.currency.trim().is_empty() {
                    return Err(ValidationError::empty_field("currency").into());
                }
            }
        }

        Ok(())
    }

    fn require_subscription_ref(&self) -> Result<&SubscriptionRef, SubscriptionError> {
        self.subscription_ref
            .as_ref()
            .ok_or(SubscriptionError::IncompleteEvent("subscription_ref"))
    }
}
