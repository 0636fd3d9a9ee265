//! GetSubscriptionHandler - read-only account view.
//!
//! Usage is shown as it will be on the next check: if a rollover is due it is
//! applied to a copy for display, never written.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    BillingCycle, Feature, FeatureLimit, Plan, PlanEntitlements, SubscriptionError, SubscriptionStatus, UsageMeter,
};
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUsageView {
    pub feature: Feature,
    pub used: u64,
    pub limit: FeatureLimit,
    pub remaining: FeatureLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub user_id: UserId,
    pub plan: Plan,
    pub effective_plan: Plan,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub is_premium: bool,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub days_remaining: u32,
    pub entitlements: PlanEntitlements,
    pub usage: Vec<FeatureUsageView>,
}

pub struct GetSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    meter: UsageMeter,
}

impl GetSubscriptionHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, meter: UsageMeter) -> Self {
        Self { repository, meter }
    }

    pub async fn handle(&self, query: GetSubscriptionQuery) -> Result<SubscriptionView, SubscriptionError> {
        let mut subscription = self
            .repository
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(query.user_id.to_string()))?;

        let now = Timestamp::now();
        self.meter.rollover_if_due(&mut subscription, now);

        let usage = Feature::ALL
            .into_iter()
            .map(|feature| FeatureUsageView {
                feature,
                used: subscription.usage.used(feature),
                limit: UsageMeter::limit(&subscription, feature),
                remaining: self.meter.remaining(&subscription, feature),
            })
            .collect();

        let effective_plan = subscription.effective_plan();
        Ok(SubscriptionView {
            plan: subscription.plan,
            effective_plan,
            status: subscription.status,
            billing_cycle: subscription.billing_cycle,
            is_premium: subscription.is_premium_eligible(),
            cancel_at_period_end: subscription.cancel_at_period_end,
            current_period_end: subscription.current_period_end,
            trial_end: subscription.trial_end,
            days_remaining: subscription.days_remaining(now),
            entitlements: PlanEntitlements::for_plan(effective_plan),
            usage,
            user_id: subscription.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::domain::foundation::{CustomerRef, SubscriptionRef};
    use crate::domain::subscription::{Capability, Subscription};

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn handler_with(sub: Subscription) -> (GetSubscriptionHandler, Arc<InMemorySubscriptionRepository>) {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        repo.insert(&sub).await.unwrap();
        (GetSubscriptionHandler::new(repo.clone(), UsageMeter::default()), repo)
    }

    fn chat_usage(view: &SubscriptionView) -> &FeatureUsageView {
        view.usage
            .iter()
            .find(|u| u.feature == Feature::AiChatMessages)
            .unwrap()
    }

    #[tokio::test]
    async fn free_view_lists_every_feature() {
        let mut sub = Subscription::initialize_free(user(), Timestamp::now());
        sub.usage.current_period.insert(Feature::AiChatMessages, 4);
        let (handler, _) = handler_with(sub).await;

        let view = handler.handle(GetSubscriptionQuery { user_id: user() }).await.unwrap();

        assert_eq!(view.usage.len(), Feature::ALL.len());
        assert_eq!(chat_usage(&view).used, 4);
        assert_eq!(chat_usage(&view).remaining, FeatureLimit::Limited(6));
        assert!(!view.is_premium);
        assert!(view.entitlements.capabilities.is_empty());
    }

    #[tokio::test]
    async fn past_due_premium_shows_free_entitlements() {
        let mut sub = Subscription::initialize_free(user(), Timestamp::now());
        sub.customer_ref = Some(CustomerRef::new("cus_1").unwrap());
        sub.subscription_ref = Some(SubscriptionRef::new("sub_1").unwrap());
        sub.plan = Plan::Premium;
        sub.status = SubscriptionStatus::PastDue;
        let (handler, _) = handler_with(sub).await;

        let view = handler.handle(GetSubscriptionQuery { user_id: user() }).await.unwrap();

        assert_eq!(view.plan, Plan::Premium);
        assert_eq!(view.effective_plan, Plan::Free);
        assert!(!view.entitlements.capabilities.contains(&Capability::AdFree));
    }

    #[tokio::test]
    async fn due_rollover_is_shown_but_not_written() {
        let mut sub = Subscription::initialize_free(user(), Timestamp::now().minus_days(40));
        sub.usage.current_period.insert(Feature::AiChatMessages, 10);
        let (handler, repo) = handler_with(sub).await;

        let view = handler.handle(GetSubscriptionQuery { user_id: user() }).await.unwrap();

        assert_eq!(chat_usage(&view).used, 0);
        let stored = repo.find_by_user_id(&user()).await.unwrap().unwrap();
        assert_eq!(stored.usage.used(Feature::AiChatMessages), 10);
    }
}
