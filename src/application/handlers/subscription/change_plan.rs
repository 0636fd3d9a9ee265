//! ChangePlanHandler - moves a live paid subscription to another price.
//!
//! The provider prorates and emits `subscription_updated`; the local plan
//! follows when that event is reconciled.

use std::sync::Arc;

use crate::application::AtomicUpdater;
use crate::domain::foundation::{UserId, ValidationError};
use crate::domain::subscription::{BillingCycle, Plan, PlanCatalog, SubscriptionError};
use crate::ports::{BillingClient, ProviderSubscription};

use super::require_provider_subscription;

#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub user_id: UserId,
    pub plan: Plan,
    pub billing_cycle: BillingCycle,
}

#[derive(Debug, Clone)]
pub struct ChangePlanResult {
    pub previous_plan: Plan,
    pub requested_plan: Plan,
    /// `None` when the subscription was already on the requested price.
    pub provider_subscription: Option<ProviderSubscription>,
}

impl ChangePlanResult {
    pub fn changed(&self) -> bool {
        self.provider_subscription.is_some()
    }
}

pub struct ChangePlanHandler {
    updater: AtomicUpdater,
    billing: Arc<dyn BillingClient>,
    catalog: PlanCatalog,
}

impl ChangePlanHandler {
    pub fn new(updater: AtomicUpdater, billing: Arc<dyn BillingClient>, catalog: PlanCatalog) -> Self {
        Self {
            updater,
            billing,
            catalog,
        }
    }

    pub async fn handle(&self, cmd: ChangePlanCommand) -> Result<ChangePlanResult, SubscriptionError> {
        if !cmd.plan.is_paid() {
            return Err(ValidationError::invalid_format("plan", "cancel the subscription to return to Free").into());
        }
        let price_ref = self
            .catalog
            .price_for(cmd.plan, cmd.billing_cycle)
            .ok_or_else(|| SubscriptionError::UnmappedPlan(format!("{} {}", cmd.plan, cmd.billing_cycle.as_str())))?;

        let current = self
            .updater
            .repository()
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.user_id.to_string()))?;
        let subscription_ref = require_provider_subscription(&current)?;

        if current.plan == cmd.plan && current.billing_cycle == cmd.billing_cycle {
            tracing::debug!(user_id = %cmd.user_id, plan = %cmd.plan, "plan change is a no-op");
            return Ok(ChangePlanResult {
                previous_plan: current.plan,
                requested_plan: cmd.plan,
                provider_subscription: None,
            });
        }

        let updated = self
            .billing
            .update_subscription_price(subscription_ref, price_ref)
            .await
            .map_err(|err| {
                tracing::error!(
                    user_id = %cmd.user_id,
                    subscription_ref = %subscription_ref,
                    error = %err,
                    "plan change failed at provider"
                );
                SubscriptionError::from(err)
            })?;

        tracing::info!(
            user_id = %cmd.user_id,
            from = %current.plan,
            to = %cmd.plan,
            cycle = cmd.billing_cycle.as_str(),
            "plan change requested"
        );

        Ok(ChangePlanResult {
            previous_plan: current.plan,
            requested_plan: cmd.plan,
            provider_subscription: Some(updated),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::stripe::MockBillingClient;
    use crate::domain::foundation::{CustomerRef, SubscriptionRef, Timestamp};
    use crate::domain::subscription::{Subscription, SubscriptionStatus};
    use crate::ports::SubscriptionRepository;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn sub_ref() -> SubscriptionRef {
        SubscriptionRef::new("sub_1").unwrap()
    }

    fn premium_monthly() -> Subscription {
        let mut sub = Subscription::initialize_free(user(), Timestamp::now());
        sub.customer_ref = Some(CustomerRef::new("cus_1").unwrap());
        sub.subscription_ref = Some(sub_ref());
        sub.plan = Plan::Premium;
        sub
    }

    async fn setup(sub: Subscription) -> (ChangePlanHandler, MockBillingClient) {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        repo.insert(&sub).await.unwrap();
        let billing = MockBillingClient::new();
        billing.add_subscription(
            ProviderSubscription {
                subscription_ref: sub_ref(),
                customer_ref: CustomerRef::new("cus_1").unwrap(),
                status: SubscriptionStatus::Active,
                cancel_at_period_end: false,
                client_secret: None,
            },
            "price_premium_monthly",
        );
        let catalog = PlanCatalog::new()
            .with_price("price_premium_monthly", Plan::Premium, BillingCycle::Monthly)
            .with_price("price_pro_yearly", Plan::Pro, BillingCycle::Yearly);
        let handler = ChangePlanHandler::new(AtomicUpdater::new(repo, 3), Arc::new(billing.clone()), catalog);
        (handler, billing)
    }

    fn command(plan: Plan, cycle: BillingCycle) -> ChangePlanCommand {
        ChangePlanCommand {
            user_id: user(),
            plan,
            billing_cycle: cycle,
        }
    }

    #[tokio::test]
    async fn upgrade_moves_provider_price() {
        let (handler, billing) = setup(premium_monthly()).await;

        let result = handler.handle(command(Plan::Pro, BillingCycle::Yearly)).await.unwrap();

        assert!(result.changed());
        assert_eq!(result.previous_plan, Plan::Premium);
        assert_eq!(billing.price_of(&sub_ref()).as_deref(), Some("price_pro_yearly"));
    }

    #[tokio::test]
    async fn same_plan_is_a_no_op() {
        let (handler, billing) = setup(premium_monthly()).await;

        let result = handler.handle(command(Plan::Premium, BillingCycle::Monthly)).await.unwrap();

        assert!(!result.changed());
        assert!(!billing.was_called("update_subscription_price"));
    }

    #[tokio::test]
    async fn free_user_cannot_change_plan() {
        let (handler, _) = setup(Subscription::initialize_free(user(), Timestamp::now())).await;

        let result = handler.handle(command(Plan::Pro, BillingCycle::Yearly)).await;

        assert!(matches!(result, Err(SubscriptionError::Validation(_))));
    }

    #[tokio::test]
    async fn downgrade_to_free_is_rejected() {
        let (handler, _) = setup(premium_monthly()).await;

        let result = handler.handle(command(Plan::Free, BillingCycle::Monthly)).await;

        assert!(matches!(result, Err(SubscriptionError::Validation(_))));
    }
}
