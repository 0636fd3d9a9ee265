//! CheckFeatureAccessHandler - pre-flight check before a gated action.
//!
//! Persists a period rollover if one was due; never records usage. Callers
//! that go ahead must still go through `RecordUsageHandler`, which re-checks
//! atomically.

use crate::application::AtomicUpdater;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    AccessDecision, Feature, FeatureAccessGate, FeatureLimit, Plan, SubscriptionError,
};

#[derive(Debug, Clone)]
pub struct CheckFeatureAccessQuery {
    pub user_id: UserId,
    pub feature: Feature,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFeatureAccessResult {
    pub decision: AccessDecision,
    pub remaining: FeatureLimit,
    pub effective_plan: Plan,
}

pub struct CheckFeatureAccessHandler {
    updater: AtomicUpdater,
    gate: FeatureAccessGate,
}

impl CheckFeatureAccessHandler {
    pub fn new(updater: AtomicUpdater, gate: FeatureAccessGate) -> Self {
        Self { updater, gate }
    }

    pub async fn handle(&self, query: CheckFeatureAccessQuery) -> Result<CheckFeatureAccessResult, SubscriptionError> {
        let now = Timestamp::now();
        let gate = self.gate;

        let (result, _) = self
            .updater
            .update(&query.user_id, |subscription| {
                let decision = gate.check_access(subscription, query.feature, query.amount, now)?;
                Ok(CheckFeatureAccessResult {
                    decision,
                    remaining: gate.meter().remaining(subscription, query.feature),
                    effective_plan: subscription.effective_plan(),
                })
            })
            .await?;

        if let AccessDecision::Deny(reason) = &result.decision {
            tracing::debug!(
                user_id = %query.user_id,
                feature = %query.feature,
                reason = ?reason,
                "feature access denied"
            );
        }
        Ok(result)
    }
}
