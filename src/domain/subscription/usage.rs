//! Usage counters carried on a subscription.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::Timestamp;

use super::Feature;

/// Per-period and lifetime counters.
///
/// `current_period` only reflects activity since `last_reset`; `lifetime`
/// never goes down. Mutation goes through [`UsageMeter`](super::UsageMeter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub current_period: BTreeMap<Feature, u64>,
    pub last_reset: Timestamp,
    pub lifetime: BTreeMap<Feature, u64>,
}

impl Usage {
    /// Empty counters whose first period begins at `now`.
    pub fn starting_at(now: Timestamp) -> Self {
        Self {
            current_period: BTreeMap::new(),
            last_reset: now,
            lifetime: BTreeMap::new(),
        }
    }

    /// Units consumed this period.
    pub fn used(&self, feature: Feature) -> u64 {
        self.current_period.get(&feature).copied().unwrap_or(0)
    }

    pub fn lifetime_total(&self, feature: Feature) -> u64 {
        self.lifetime.get(&feature).copied().unwrap_or(0)
    }

    pub(crate) fn reset_period(&mut self, now: Timestamp) {
        self.current_period.clear();
        self.last_reset = now;
    }

    pub(crate) fn add(&mut self, feature: Feature, amount: u64) {
        let period = self.current_period.entry(feature).or_insert(0);
        *period = period.saturating_add(amount);
        let lifetime = self.lifetime.entry(feature).or_insert(0);
        *lifetime = lifetime.saturating_add(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).unwrap()
    }

    #[test]
    fn new_usage_is_empty() {
        let usage = Usage::starting_at(t0());
        assert_eq!(usage.used(Feature::AiChatMessages), 0);
        assert_eq!(usage.lifetime_total(Feature::AiChatMessages), 0);
        assert_eq!(usage.last_reset, t0());
    }

    #[test]
    fn add_increments_both_counters() {
        let mut usage = Usage::starting_at(t0());
        usage.add(Feature::CustomQuizzes, 2);
        usage.add(Feature::CustomQuizzes, 1);
        assert_eq!(usage.used(Feature::CustomQuizzes), 3);
        assert_eq!(usage.lifetime_total(Feature::CustomQuizzes), 3);
    }

    #[test]
    fn reset_keeps_lifetime() {
        let mut usage = Usage::starting_at(t0());
        usage.add(Feature::AiChatMessages, 7);
        usage.reset_period(t0().add_days(30));

        assert_eq!(usage.used(Feature::AiChatMessages), 0);
        assert_eq!(usage.lifetime_total(Feature::AiChatMessages), 7);
        assert_eq!(usage.last_reset, t0().add_days(30));
    }

    #[test]
    fn serializes_feature_keys_by_wire_name() {
        let mut usage = Usage::starting_at(t0());
        usage.add(Feature::AiChatMessages, 1);
        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["currentPeriod"]["aiChatMessages"], 1);
        assert_eq!(json["lifetime"]["aiChatMessages"], 1);
    }
}
