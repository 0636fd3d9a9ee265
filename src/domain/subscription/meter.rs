//! Usage meter: lazy period rollover and quota checks.
//!
//! Every operation here acts on a single subscription value. Callers run
//! them inside one atomic read-modify-write of that record.

use chrono::Duration;

use crate::domain::foundation::Timestamp;

use super::{EntitlementPolicy, Feature, FeatureLimit, Subscription};

/// Length of the usage window for records without a provider period.
pub const DEFAULT_FREE_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMeter {
    free_period: Duration,
}

impl Default for UsageMeter {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_PERIOD_DAYS)
    }
}

impl UsageMeter {
    pub fn new(free_period_days: i64) -> Self {
        Self {
            free_period: Duration::days(free_period_days.max(1)),
        }
    }

    /// True if the counters belong to a period that has already ended.
    ///
    /// - provider period ended and we have not reset since its end
    /// - the provider started a new period after our last reset
    /// - no provider period at all and the free window has elapsed
    pub fn rollover_due(&self, subscription: &Subscription, now: Timestamp) -> bool {
        let last_reset = subscription.usage.last_reset;

        let ended = subscription
            .current_period_end
            .map(|end| !now.is_before(&end) && last_reset.is_before(&end))
            .unwrap_or(false);

        let renewed = subscription
            .current_period_start
            .map(|start| last_reset.is_before(&start))
            .unwrap_or(false);

        let free_window_elapsed = subscription.current_period_start.is_none()
            && subscription.current_period_end.is_none()
            && now.duration_since(&last_reset) >= self.free_period;

        ended || renewed || free_window_elapsed
    }

    /// Zeroes period counters if their period is over. Returns whether it did.
    ///
    /// Calling it twice within one period is a no-op the second time.
    pub fn rollover_if_due(&self, subscription: &mut Subscription, now: Timestamp) -> bool {
        if !self.rollover_due(subscription, now) {
            return false;
        }
        subscription.usage.reset_period(now);
        tracing::debug!(user_id = %subscription.user_id, "usage period rolled over");
        true
    }

    /// Rolls over if due, then checks whether `amount` more units fit.
    pub fn can_use(&self, subscription: &mut Subscription, feature: Feature, amount: u32, now: Timestamp) -> bool {
        self.rollover_if_due(subscription, now);
        let limit = Self::limit(subscription, feature);
        limit.admits(subscription.usage.used(feature), u64::from(amount))
    }

    /// Counts `amount` units against both the period and lifetime totals.
    pub fn record_usage(&self, subscription: &mut Subscription, feature: Feature, amount: u32, now: Timestamp) {
        subscription.usage.add(feature, u64::from(amount));
        subscription.updated_at = now;
    }

    /// Units left this period, or `Unlimited`.
    pub fn remaining(&self, subscription: &Subscription, feature: Feature) -> FeatureLimit {
        Self::limit(subscription, feature).remaining_after(subscription.usage.used(feature))
    }

    /// The limit that applies to `subscription` right now.
    pub fn limit(subscription: &Subscription, feature: Feature) -> FeatureLimit {
        EntitlementPolicy::limit_for(subscription.effective_plan(), feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{SubscriptionRef, UserId};
    use crate::domain::subscription::{Plan, SubscriptionStatus};
    use proptest::prelude::*;

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).unwrap()
    }

    fn free() -> Subscription {
        Subscription::initialize_free(UserId::new("user-1").unwrap(), t0())
    }

    fn paid(plan: Plan) -> Subscription {
        let mut sub = free();
        sub.plan = plan;
        sub.subscription_ref = Some(SubscriptionRef::new("sub_1").unwrap());
        sub.current_period_start = Some(t0());
        sub.current_period_end = Some(t0().add_days(30));
        sub
    }

    // ═══════════════════════════════════════════════════════════════════
    // Quota checks
    // ═══════════════════════════════════════════════════════════════════

    #[test]
    fn free_user_gets_ten_chat_messages() {
        let meter = UsageMeter::default();
        let mut sub = free();

        for _ in 0..10 {
            assert!(meter.can_use(&mut sub, Feature::AiChatMessages, 1, t0()));
            meter.record_usage(&mut sub, Feature::AiChatMessages, 1, t0());
        }

        assert!(!meter.can_use(&mut sub, Feature::AiChatMessages, 1, t0()));
        assert_eq!(
            meter.remaining(&sub, Feature::AiChatMessages),
            FeatureLimit::Limited(0)
        );
    }

    #[test]
    fn amount_larger_than_remaining_is_refused() {
        let meter = UsageMeter::default();
        let mut sub = free();
        meter.record_usage(&mut sub, Feature::CustomQuizzes, 2, t0());

        assert!(meter.can_use(&mut sub, Feature::CustomQuizzes, 1, t0()));
        assert!(!meter.can_use(&mut sub, Feature::CustomQuizzes, 2, t0()));
    }

    #[test]
    fn feature_missing_from_plan_is_refused() {
        let meter = UsageMeter::default();
        let mut sub = free();
        assert!(!meter.can_use(&mut sub, Feature::OfflineDownloads, 1, t0()));
        assert_eq!(
            meter.remaining(&sub, Feature::OfflineDownloads),
            FeatureLimit::Limited(0)
        );
    }

    #[test]
    fn unlimited_feature_reports_unlimited_remaining() {
        let meter = UsageMeter::default();
        let mut sub = paid(Plan::Pro);
        meter.record_usage(&mut sub, Feature::AiChatMessages, 1_000_000, t0());

        assert!(meter.can_use(&mut sub, Feature::AiChatMessages, 1, t0()));
        assert_eq!(
            meter.remaining(&sub, Feature::AiChatMessages),
            FeatureLimit::Unlimited
        );
    }

    #[test]
    fn inactive_paid_plan_uses_free_limits() {
        let meter = UsageMeter::default();
        let mut sub = paid(Plan::Premium);
        sub.status = SubscriptionStatus::Unpaid;
        meter.record_usage(&mut sub, Feature::AiChatMessages, 10, t0());

        assert!(!meter.can_use(&mut sub, Feature::AiChatMessages, 1, t0()));
    }

    #[test]
    fn record_usage_grows_lifetime() {
        let meter = UsageMeter::default();
        let mut sub = free();
        meter.record_usage(&mut sub, Feature::AiChatMessages, 3, t0());
        assert_eq!(sub.usage.lifetime_total(Feature::AiChatMessages), 3);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Rollover
    // ═══════════════════════════════════════════════════════════════════

    #[test]
    fn past_period_end_resets_before_checking() {
        let meter = UsageMeter::default();
        let mut sub = paid(Plan::Premium);
        meter.record_usage(&mut sub, Feature::AiChatMessages, 500, t0());
        let after_end = t0().add_days(31);

        assert!(meter.can_use(&mut sub, Feature::AiChatMessages, 1, after_end));
        assert_eq!(sub.usage.used(Feature::AiChatMessages), 0);
        assert_eq!(sub.usage.last_reset, after_end);
        assert_eq!(sub.usage.lifetime_total(Feature::AiChatMessages), 500);
    }

    #[test]
    fn rollover_runs_once_per_boundary() {
        let meter = UsageMeter::default();
        let mut sub = paid(Plan::Premium);
        let after_end = t0().add_days(31);

        assert!(meter.rollover_if_due(&mut sub, after_end));
        meter.record_usage(&mut sub, Feature::AiChatMessages, 4, after_end);

        assert!(!meter.rollover_if_due(&mut sub, after_end.add_days(1)));
        assert_eq!(sub.usage.used(Feature::AiChatMessages), 4);
    }

    #[test]
    fn provider_renewal_after_lazy_reset_does_not_reset_again() {
        let meter = UsageMeter::default();
        let mut sub = paid(Plan::Premium);
        let after_end = t0().add_days(31);
        meter.rollover_if_due(&mut sub, after_end);
        meter.record_usage(&mut sub, Feature::AiChatMessages, 2, after_end);

        sub.current_period_start = Some(t0().add_days(30));
        sub.current_period_end = Some(t0().add_days(60));

        assert!(!meter.rollover_if_due(&mut sub, after_end.add_days(1)));
        assert_eq!(sub.usage.used(Feature::AiChatMessages), 2);
    }

    #[test]
    fn new_period_start_after_last_reset_triggers_rollover() {
        let meter = UsageMeter::default();
        let mut sub = paid(Plan::Premium);
        meter.record_usage(&mut sub, Feature::AiChatMessages, 9, t0());

        sub.current_period_start = Some(t0().add_days(30));
        sub.current_period_end = Some(t0().add_days(60));

        assert!(meter.rollover_if_due(&mut sub, t0().add_days(30)));
        assert_eq!(sub.usage.used(Feature::AiChatMessages), 0);
    }

    #[test]
    fn no_rollover_inside_period() {
        let meter = UsageMeter::default();
        let mut sub = paid(Plan::Premium);
        assert!(!meter.rollover_if_due(&mut sub, t0().add_days(10)));
    }

    #[test]
    fn free_record_rolls_over_after_free_window() {
        let meter = UsageMeter::new(30);
        let mut sub = free();
        meter.record_usage(&mut sub, Feature::AiChatMessages, 10, t0());

        assert!(!meter.can_use(&mut sub, Feature::AiChatMessages, 1, t0().add_days(29)));
        assert!(meter.can_use(&mut sub, Feature::AiChatMessages, 1, t0().add_days(30)));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════

    proptest! {
        #[test]
        fn recording_the_full_limit_exhausts_it(limit_used in 0u32..=10) {
            let meter = UsageMeter::default();
            let mut sub = free();
            meter.record_usage(&mut sub, Feature::AiChatMessages, limit_used, t0());
            let left = 10 - limit_used;

            prop_assert_eq!(meter.remaining(&sub, Feature::AiChatMessages), FeatureLimit::Limited(left));
            if left > 0 {
                prop_assert!(meter.can_use(&mut sub, Feature::AiChatMessages, left, t0()));
            }
            meter.record_usage(&mut sub, Feature::AiChatMessages, left, t0());
            prop_assert!(!meter.can_use(&mut sub, Feature::AiChatMessages, 1, t0()));
        }

        #[test]
        fn unlimited_always_allows(used in 0u32..u32::MAX, amount in 1u32..10_000) {
            let meter = UsageMeter::default();
            let mut sub = paid(Plan::Pro);
            meter.record_usage(&mut sub, Feature::PronunciationReviews, used, t0());
            prop_assert!(meter.can_use(&mut sub, Feature::PronunciationReviews, amount, t0()));
        }

        #[test]
        fn rollover_is_idempotent(offset_days in 0i64..120) {
            let meter = UsageMeter::default();
            let mut sub = paid(Plan::Premium);
            let now = t0().add_days(offset_days);
            meter.rollover_if_due(&mut sub, now);
            let snapshot = sub.clone();
            prop_assert!(!meter.rollover_if_due(&mut sub, now));
            prop_assert_eq!(sub, snapshot);
        }
    }
}
