//! ResumeSubscriptionHandler - withdraws a pending cancel-at-period-end.

use std::sync::Arc;

use crate::application::AtomicUpdater;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::BillingClient;

use super::require_provider_subscription;

#[derive(Debug, Clone)]
pub struct ResumeSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct ResumeSubscriptionResult {
    pub subscription: Subscription,
    /// False if nothing was pending.
    pub resumed: bool,
}

pub struct ResumeSubscriptionHandler {
    updater: AtomicUpdater,
    billing: Arc<dyn BillingClient>,
}

impl ResumeSubscriptionHandler {
    pub fn new(updater: AtomicUpdater, billing: Arc<dyn BillingClient>) -> Self {
        Self { updater, billing }
    }

    pub async fn handle(&self, cmd: ResumeSubscriptionCommand) -> Result<ResumeSubscriptionResult, SubscriptionError> {
        let current = self
            .updater
            .repository()
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.user_id.to_string()))?;
        let subscription_ref = require_provider_subscription(&current)?.clone();

        if !current.cancel_at_period_end {
            return Ok(ResumeSubscriptionResult {
                subscription: current,
                resumed: false,
            });
        }

        self.billing
            .set_cancel_at_period_end(&subscription_ref, false)
            .await
            .map_err(|err| {
                tracing::error!(user_id = %cmd.user_id, error = %err, "resume failed at provider");
                SubscriptionError::from(err)
            })?;

        let now = Timestamp::now();
        let (_, subscription) = self
            .updater
            .update(&cmd.user_id, |subscription| subscription.set_cancel_at_period_end(false, now))
            .await?;

        tracing::info!(user_id = %cmd.user_id, subscription_ref = %subscription_ref, "subscription resumed");
        Ok(ResumeSubscriptionResult {
            subscription,
            resumed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::stripe::MockBillingClient;
    use crate::domain::foundation::{CustomerRef, SubscriptionRef};
    use crate::domain::subscription::{Plan, SubscriptionStatus};
    use crate::ports::{ProviderSubscription, SubscriptionRepository};

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn sub_ref() -> SubscriptionRef {
        SubscriptionRef::new("sub_1").unwrap()
    }

    async fn setup(cancel_pending: bool) -> (ResumeSubscriptionHandler, Arc<InMemorySubscriptionRepository>, MockBillingClient) {
        let mut sub = Subscription::initialize_free(user(), Timestamp::now());
        sub.customer_ref = Some(CustomerRef::new("cus_1").unwrap());
        sub.subscription_ref = Some(sub_ref());
        sub.plan = Plan::Pro;
        sub.cancel_at_period_end = cancel_pending;

        let repo = Arc::new(InMemorySubscriptionRepository::new());
        repo.insert(&sub).await.unwrap();
        let billing = MockBillingClient::new();
        billing.add_subscription(
            ProviderSubscription {
                subscription_ref: sub_ref(),
                customer_ref: CustomerRef::new("cus_1").unwrap(),
                status: SubscriptionStatus::Active,
                cancel_at_period_end: cancel_pending,
                client_secret: None,
            },
            "price_pro_monthly",
        );
        let handler = ResumeSubscriptionHandler::new(AtomicUpdater::new(repo.clone(), 3), Arc::new(billing.clone()));
        (handler, repo, billing)
    }

    #[tokio::test]
    async fn clears_pending_cancellation() {
        let (handler, repo, billing) = setup(true).await;

        let result = handler.handle(ResumeSubscriptionCommand { user_id: user() }).await.unwrap();

        assert!(result.resumed);
        assert!(!repo.find_by_user_id(&user()).await.unwrap().unwrap().cancel_at_period_end);
        let provider = billing.subscription(&sub_ref()).unwrap();
        assert!(!provider.cancel_at_period_end);
    }

    #[tokio::test]
    async fn nothing_pending_skips_provider() {
        let (handler, _, billing) = setup(false).await;

        let result = handler.handle(ResumeSubscriptionCommand { user_id: user() }).await.unwrap();

        assert!(!result.resumed);
        assert!(!billing.was_called("set_cancel_at_period_end"));
    }
}
