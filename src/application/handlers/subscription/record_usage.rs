//! RecordUsageHandler - indivisible check-and-increment.
//!
//! Two callers racing for the last unit both pass the pre-flight check, but
//! only one of them gets through here: the loser re-reads the record after
//! its write conflicts and is denied.

use crate::application::AtomicUpdater;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{AccessDecision, Feature, FeatureAccessGate, FeatureLimit, SubscriptionError};

#[derive(Debug, Clone)]
pub struct RecordUsageCommand {
    pub user_id: UserId,
    pub feature: Feature,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUsageResult {
    pub decision: AccessDecision,
    /// Headroom after this call.
    pub remaining: FeatureLimit,
}

impl RecordUsageResult {
    pub fn recorded(&self) -> bool {
        self.decision.is_allowed()
    }
}

pub struct RecordUsageHandler {
    updater: AtomicUpdater,
    gate: FeatureAccessGate,
}

impl RecordUsageHandler {
    pub fn new(updater: AtomicUpdater, gate: FeatureAccessGate) -> Self {
        Self { updater, gate }
    }

    pub async fn handle(&self, cmd: RecordUsageCommand) -> Result<RecordUsageResult, SubscriptionError> {
        let now = Timestamp::now();
        let gate = self.gate;

        let (result, _) = self
            .updater
            .update(&cmd.user_id, |subscription| {
                let decision = gate.try_consume(subscription, cmd.feature, cmd.amount, now)?;
                Ok(RecordUsageResult {
                    decision,
                    remaining: gate.meter().remaining(subscription, cmd.feature),
                })
            })
            .await?;

        tracing::debug!(
            user_id = %cmd.user_id,
            feature = %cmd.feature,
            amount = cmd.amount,
            recorded = result.recorded(),
            "usage recorded"
        );
        Ok(result)
    }
}
