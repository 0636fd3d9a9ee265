//! Subscription aggregate.
//!
//! Exactly one record exists per user from account creation onwards. Records
//! are never deleted; a provider-side deletion retires the record to
//! `plan = Free`, `status = Canceled`.
//!
//! # Design Decisions
//!
//! - **Limits are derived**: nothing here stores a quota; see `EntitlementPolicy`
//! - **Provider owns paid state**: plan, status and periods change only through
//!   the reconciler; local requests touch `cancel_at_period_end` and the
//!   customer link
//! - **Optimistic concurrency**: `revision` is compared and bumped by the
//!   repository on every write

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CustomerRef, SubscriptionRef, Timestamp, UserId, ValidationError};

use super::{
    BillingCycle, Discount, EventVersion, PaymentHistory, Plan, SubscriptionError,
    SubscriptionStatus, Usage,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: UserId,

    /// `None` until payment setup has begun.
    pub customer_ref: Option<CustomerRef>,

    /// `None` while the user has never had a provider subscription.
    pub subscription_ref: Option<SubscriptionRef>,

    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,

    /// Provider billing period. Both absent for Free.
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,

    /// User intent to stop renewing. Independent of `status`.
    pub cancel_at_period_end: bool,

    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,

    pub usage: Usage,
    pub payment_history: PaymentHistory,
    pub discount: Option<Discount>,

    /// Version of the newest subscription-state event applied.
    pub last_event_version: Option<EventVersion>,

    /// Storage revision for compare-and-swap writes.
    pub revision: u64,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// The record every account starts with.
    pub fn initialize_free(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            customer_ref: None,
            subscription_ref: None,
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            billing_cycle: BillingCycle::Monthly,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            trial_start: None,
            trial_end: None,
            canceled_at: None,
            usage: Usage::starting_at(now),
            payment_history: PaymentHistory::new(),
            discount: None,
            last_event_version: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active or trialing. Period dates play no part.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_premium_eligible(&self) -> bool {
        self.is_active() && self.plan.is_paid()
    }

    /// Informational only: the provider decides when access actually ends.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.current_period_end
            .map(|end| end.is_before(&now))
            .unwrap_or(false)
    }

    /// Plan whose limits apply right now.
    ///
    /// A paid plan only counts while the subscription is active; otherwise
    /// the user falls back to Free entitlements.
    pub fn effective_plan(&self) -> Plan {
        if self.is_premium_eligible() {
            self.plan
        } else {
            Plan::Free
        }
    }

    /// Records the provider customer created for this user.
    ///
    /// Linking the same customer twice is a no-op; relinking to a different
    /// customer is rejected.
    pub fn link_customer(&mut self, customer_ref: CustomerRef, now: Timestamp) -> Result<(), SubscriptionError> {
        match &self.customer_ref {
            Some(existing) if existing == &customer_ref => Ok(()),
            Some(existing) => Err(ValidationError::invalid_format(
                "customer_ref",
                format!("already linked to {}", existing),
            )
            .into()),
            None => {
                self.customer_ref = Some(customer_ref);
                self.updated_at = now;
                Ok(())
            }
        }
    }

    /// Sets or clears the cancel-at-period-end intent.
    ///
    /// Only meaningful for a live provider subscription.
    pub fn set_cancel_at_period_end(&mut self, cancel: bool, now: Timestamp) -> Result<(), SubscriptionError> {
        if self.subscription_ref.is_none() {
            return Err(ValidationError::invalid_format(
                "subscription_ref",
                "no paid subscription to update",
            )
            .into());
        }
        if matches!(
            self.status,
            SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired
        ) {
            return Err(ValidationError::invalid_format(
                "status",
                format!("subscription is already {}", self.status),
            )
            .into());
        }
        if self.cancel_at_period_end != cancel {
            self.cancel_at_period_end = cancel;
            self.updated_at = now;
        }
        Ok(())
    }

    /// Days left in the current paid period, zero if none.
    pub fn days_remaining(&self, now: Timestamp) -> u32 {
        self.current_period_end
            .map(|end| end.duration_since(&now).num_days().max(0))
            .and_then(|days| u32::try_from(days).ok())
            .unwrap_or(0)
    }
}
