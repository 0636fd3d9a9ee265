//! Billing event reconciler.
//!
//! Applies provider snapshots to a subscription. Safe under at-least-once,
//! out-of-order delivery:
//!
//! - subscription-state events carry a version; anything older than the last
//!   applied version is rejected as stale
//! - an event with the same version as the applied one is applied only if it
//!   changes the record (the provider stamps versions in whole seconds, and a
//!   creation and its first update often share one); an identical redelivery
//!   is stale
//! - state is copied from the snapshot, so re-applying converges
//! - payment events are deduplicated by payment id and skip versioning,
//!   since they never change subscription state

use crate::domain::foundation::{PaymentId, StateMachine, SubscriptionRef, Timestamp};

use super::{
    BillingEventKind, BillingEventSnapshot, PaymentRecord, Plan, PlanCatalog, Subscription,
    SubscriptionError, SubscriptionStatus,
};

/// What applying a snapshot did to the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    StateApplied {
        status: SubscriptionStatus,
        plan: Plan,
    },
    PaymentRecorded {
        payment_id: PaymentId,
    },
    DuplicatePayment {
        payment_id: PaymentId,
    },
}

impl ReconcileOutcome {
    /// True if the record changed and must be written back.
    pub fn is_change(&self) -> bool {
        !matches!(self, ReconcileOutcome::DuplicatePayment { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BillingEventReconciler {
    catalog: PlanCatalog,
}

impl BillingEventReconciler {
    pub fn new(catalog: PlanCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Applies `snapshot` to `subscription`.
    ///
    /// On error the subscription is left exactly as it was.
    pub fn apply(
        &self,
        subscription: &mut Subscription,
        snapshot: &BillingEventSnapshot,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        snapshot.validate()?;

        match snapshot.kind {
            BillingEventKind::PaymentSucceeded | BillingEventKind::PaymentFailed => {
                Self::apply_payment(subscription, snapshot, now)
            }
            BillingEventKind::SubscriptionDeleted
            | BillingEventKind::SubscriptionCreated
            | BillingEventKind::SubscriptionUpdated => self.apply_versioned(subscription, snapshot, now),
        }
    }

    /// Applies a subscription-state snapshot on a copy, then commits it
    /// unless ordering says it must be dropped.
    fn apply_versioned(
        &self,
        subscription: &mut Subscription,
        snapshot: &BillingEventSnapshot,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let applied = subscription.last_event_version;
        let stale = || SubscriptionError::StaleEvent {
            incoming: snapshot.version,
            applied: applied.unwrap_or(snapshot.version),
        };
        if let Some(applied) = applied {
            if applied.is_newer_than(&snapshot.version) {
                return Err(stale());
            }
        }

        let mut next = subscription.clone();
        let outcome = match snapshot.kind {
            BillingEventKind::SubscriptionDeleted => Self::apply_deletion(&mut next, snapshot, now)?,
            _ => self.apply_state(&mut next, snapshot, now)?,
        };

        if applied == Some(snapshot.version) && Self::same_state(subscription, &next) {
            return Err(stale());
        }
        *subscription = next;
        Ok(outcome)
    }

    /// True if `next` differs from `current` only in its write timestamp.
    fn same_state(current: &Subscription, next: &Subscription) -> bool {
        let next = Subscription {
            updated_at: current.updated_at,
            ..next.clone()
        };
        next == *current
    }

    fn apply_payment(
        subscription: &mut Subscription,
        snapshot: &BillingEventSnapshot,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let (payment, outcome) = match (&snapshot.payment, snapshot.kind.payment_outcome()) {
            (Some(payment), Some(outcome)) => (payment, outcome),
            _ => return Err(SubscriptionError::IncompleteEvent("payment")),
        };

        let record = PaymentRecord {
            payment_id: payment.payment_id.clone(),
            amount_cents: payment.amount_cents,
            currency: payment.currency.to_lowercase(),
            outcome,
            occurred_at: payment.occurred_at,
        };

        if !subscription.payment_history.append(record) {
            return Ok(ReconcileOutcome::DuplicatePayment {
                payment_id: payment.payment_id.clone(),
            });
        }
        subscription.updated_at = now;
        Ok(ReconcileOutcome::PaymentRecorded {
            payment_id: payment.payment_id.clone(),
        })
    }

    fn apply_deletion(
        subscription: &mut Subscription,
        snapshot: &BillingEventSnapshot,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let incoming = Self::incoming_ref(snapshot)?;
        if let Some(current) = &subscription.subscription_ref {
            if current != incoming {
                return Err(SubscriptionError::SupersededSubscription(incoming.clone()));
            }
        }

        subscription.subscription_ref = Some(incoming.clone());
        subscription.status = SubscriptionStatus::Canceled;
        subscription.plan = Plan::Free;
        subscription.canceled_at = snapshot.canceled_at.or(subscription.canceled_at).or(Some(now));
        subscription.cancel_at_period_end = false;
        subscription.current_period_start = None;
        subscription.current_period_end = None;
        subscription.discount = None;
        subscription.last_event_version = Some(snapshot.version);
        subscription.updated_at = now;

        Ok(ReconcileOutcome::StateApplied {
            status: SubscriptionStatus::Canceled,
            plan: Plan::Free,
        })
    }

    fn apply_state(
        &self,
        subscription: &mut Subscription,
        snapshot: &BillingEventSnapshot,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let incoming = Self::incoming_ref(snapshot)?;
        let target = snapshot.status.ok_or(SubscriptionError::IncompleteEvent("status"))?;
        let price_ref = snapshot
            .price_ref
            .as_deref()
            .ok_or(SubscriptionError::IncompleteEvent("price_ref"))?;

        match &subscription.subscription_ref {
            Some(current) if current == incoming => {
                if subscription.status != target {
                    subscription
                        .status
                        .transition_to(target)
                        .map_err(|_| SubscriptionError::InvalidTransition {
                            from: subscription.status,
                            to: target,
                        })?;
                }
            }
            Some(current) => {
                // A different provider subscription. A live replacement takes
                // over; the wind-down of the old one must not.
                let current_is_live = !subscription.status.is_terminal();
                if current_is_live && target.is_terminal() {
                    return Err(SubscriptionError::SupersededSubscription(incoming.clone()));
                }
                tracing::info!(
                    user_id = %subscription.user_id,
                    previous = %current,
                    next = %incoming,
                    "adopting new provider subscription"
                );
            }
            None => {}
        }

        let (plan, cycle) = self.catalog.resolve_or_free(price_ref);

        if subscription.customer_ref.is_none() {
            subscription.customer_ref = snapshot.customer_ref.clone();
        }
        subscription.subscription_ref = Some(incoming.clone());
        subscription.status = target;
        subscription.plan = plan;
        subscription.billing_cycle = cycle;
        subscription.current_period_start = snapshot.current_period_start;
        subscription.current_period_end = snapshot.current_period_end;
        subscription.cancel_at_period_end = snapshot.cancel_at_period_end;
        subscription.trial_start = snapshot.trial_start;
        subscription.trial_end = snapshot.trial_end;
        if snapshot.canceled_at.is_some() {
            subscription.canceled_at = snapshot.canceled_at;
        }
        subscription.discount = snapshot.discount.clone();
        subscription.last_event_version = Some(snapshot.version);
        subscription.updated_at = now;

        Ok(ReconcileOutcome::StateApplied { status: target, plan })
    }

    fn incoming_ref(snapshot: &BillingEventSnapshot) -> Result<&SubscriptionRef, SubscriptionError> {
        snapshot
            .subscription_ref
            .as_ref()
            .ok_or(SubscriptionError::IncompleteEvent("subscription_ref"))
    }
}
