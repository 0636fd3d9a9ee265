//! ApplyBillingEventHandler - reconciles a verified provider event.
//!
//! Stale and superseded events are expected under at-least-once, unordered
//! delivery. They are logged and reported as discarded rather than failing,
//! so the provider stops redelivering them.

use crate::application::AtomicUpdater;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    BillingEventReconciler, BillingEventSnapshot, EventVersion, ReconcileOutcome, SubscriptionError,
};

#[derive(Debug, Clone)]
pub struct ApplyBillingEventCommand {
    pub snapshot: BillingEventSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    Applied(ReconcileOutcome),
    DuplicatePayment,
    Stale {
        incoming: EventVersion,
        applied: EventVersion,
    },
    /// Targets a provider subscription the user has moved past.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyBillingEventResult {
    pub user_id: UserId,
    pub disposition: EventDisposition,
}

pub struct ApplyBillingEventHandler {
    updater: AtomicUpdater,
    reconciler: BillingEventReconciler,
}

impl ApplyBillingEventHandler {
    pub fn new(updater: AtomicUpdater, reconciler: BillingEventReconciler) -> Self {
        Self { updater, reconciler }
    }

    pub async fn handle(&self, cmd: ApplyBillingEventCommand) -> Result<ApplyBillingEventResult, SubscriptionError> {
        let snapshot = cmd.snapshot;
        snapshot.validate()?;

        let user_id = self.locate(&snapshot).await?;
        let now = Timestamp::now();
        let reconciler = &self.reconciler;

        let applied = self
            .updater
            .update(&user_id, |subscription| reconciler.apply(subscription, &snapshot, now))
            .await;

        let disposition = match applied {
            Ok((ReconcileOutcome::DuplicatePayment { payment_id }, _)) => {
                tracing::debug!(
                    event_id = %snapshot.event_id,
                    payment_id = %payment_id,
                    "duplicate payment event ignored"
                );
                EventDisposition::DuplicatePayment
            }
            Ok((outcome, stored)) => {
                tracing::info!(
                    event_id = %snapshot.event_id,
                    kind = %snapshot.kind,
                    user_id = %user_id,
                    plan = %stored.plan,
                    status = %stored.status,
                    "billing event applied"
                );
                EventDisposition::Applied(outcome)
            }
            Err(SubscriptionError::StaleEvent { incoming, applied }) => {
                tracing::warn!(
                    event_id = %snapshot.event_id,
                    kind = %snapshot.kind,
                    user_id = %user_id,
                    incoming = %incoming,
                    applied = %applied,
                    "stale billing event dropped"
                );
                EventDisposition::Stale { incoming, applied }
            }
            Err(SubscriptionError::SupersededSubscription(subscription_ref)) => {
                tracing::warn!(
                    event_id = %snapshot.event_id,
                    kind = %snapshot.kind,
                    user_id = %user_id,
                    subscription_ref = %subscription_ref,
                    "billing event for superseded subscription dropped"
                );
                EventDisposition::Superseded
            }
            Err(err) => {
                tracing::warn!(
                    event_id = %snapshot.event_id,
                    kind = %snapshot.kind,
                    user_id = %user_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "billing event rejected"
                );
                return Err(err);
            }
        };

        Ok(ApplyBillingEventResult { user_id, disposition })
    }

    /// Finds the owning user, preferring the subscription ref.
    async fn locate(&self, snapshot: &BillingEventSnapshot) -> Result<UserId, SubscriptionError> {
        let repository = self.updater.repository();

        if let Some(subscription_ref) = &snapshot.subscription_ref {
            if let Some(found) = repository.find_by_subscription_ref(subscription_ref).await? {
                return Ok(found.user_id);
            }
        }
        if let Some(customer_ref) = &snapshot.customer_ref {
            if let Some(found) = repository.find_by_customer_ref(customer_ref).await? {
                return Ok(found.user_id);
            }
        }

        let lookup = snapshot
            .subscription_ref
            .as_ref()
            .map(|r| r.to_string())
            .or_else(|| snapshot.customer_ref.as_ref().map(|r| r.to_string()))
            .unwrap_or_default();
        tracing::warn!(event_id = %snapshot.event_id, lookup = %lookup, "no subscription for billing event");
        Err(SubscriptionError::not_found(lookup))
    }
}
