//! CancelSubscriptionHandler - ends a paid subscription now or at period end.
//!
//! Cancelling at period end keeps access until the period closes; the flag is
//! mirrored locally so the account page reflects it before the webhook lands.
//! Immediate cancellation waits for the provider's deletion event.

use std::sync::Arc;

use crate::application::AtomicUpdater;
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::{BillingClient, ProviderSubscription};

use super::require_provider_subscription;

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    pub at_period_end: bool,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,
    pub provider_subscription: ProviderSubscription,
}

pub struct CancelSubscriptionHandler {
    updater: AtomicUpdater,
    billing: Arc<dyn BillingClient>,
}

impl CancelSubscriptionHandler {
    pub fn new(updater: AtomicUpdater, billing: Arc<dyn BillingClient>) -> Self {
        Self { updater, billing }
    }

    pub async fn handle(&self, cmd: CancelSubscriptionCommand) -> Result<CancelSubscriptionResult, SubscriptionError> {
        let current = self
            .updater
            .repository()
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.user_id.to_string()))?;
        let subscription_ref = require_provider_subscription(&current)?.clone();

        if !cmd.at_period_end {
            let provider_subscription = self
                .billing
                .cancel_subscription_now(&subscription_ref)
                .await
                .map_err(|err| {
                    tracing::error!(user_id = %cmd.user_id, error = %err, "immediate cancellation failed");
                    SubscriptionError::from(err)
                })?;
            tracing::info!(
                user_id = %cmd.user_id,
                subscription_ref = %subscription_ref,
                "subscription canceled immediately, awaiting deletion event"
            );
            return Ok(CancelSubscriptionResult {
                subscription: current,
                provider_subscription,
            });
        }

        let provider_subscription = self
            .billing
            .set_cancel_at_period_end(&subscription_ref, true)
            .await
            .map_err(|err| {
                tracing::error!(user_id = %cmd.user_id, error = %err, "cancel at period end failed");
                SubscriptionError::from(err)
            })?;

        let now = Timestamp::now();
        let (_, subscription) = self
            .updater
            .update(&cmd.user_id, |subscription| subscription.set_cancel_at_period_end(true, now))
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_ref = %subscription_ref,
            period_end = ?subscription.current_period_end,
            "subscription set to cancel at period end"
        );

        Ok(CancelSubscriptionResult {
            subscription,
            provider_subscription,
        })
    }
}
