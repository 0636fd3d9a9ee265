//! StartPaidSubscriptionHandler - begins a paid subscription at the provider.
//!
//! Only the customer link is written here. Plan and status change when the
//! provider's `subscription_created` event is reconciled, so a payment that
//! never completes never grants access.

use std::sync::Arc;

use uuid::Uuid;

use crate::application::AtomicUpdater;
use crate::domain::foundation::{CustomerRef, StateMachine, Timestamp, UserId, ValidationError};
use crate::domain::subscription::{BillingCycle, Plan, PlanCatalog, Subscription, SubscriptionError, SubscriptionStatus};
use crate::ports::{BillingClient, CreateCustomerRequest, CreateSubscriptionRequest, ProviderSubscription};

#[derive(Debug, Clone)]
pub struct StartPaidSubscriptionCommand {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub plan: Plan,
    pub billing_cycle: BillingCycle,
    pub trial_days: Option<u32>,
    pub coupon: Option<String>,
    /// Client-generated id of this checkout attempt. Resubmitting with the
    /// same id reaches the provider once.
    pub checkout_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct StartPaidSubscriptionResult {
    pub customer_ref: CustomerRef,
    pub provider_subscription: ProviderSubscription,
}

pub struct StartPaidSubscriptionHandler {
    updater: AtomicUpdater,
    billing: Arc<dyn BillingClient>,
    catalog: PlanCatalog,
}

impl StartPaidSubscriptionHandler {
    pub fn new(updater: AtomicUpdater, billing: Arc<dyn BillingClient>, catalog: PlanCatalog) -> Self {
        Self {
            updater,
            billing,
            catalog,
        }
    }

    pub async fn handle(
        &self,
        cmd: StartPaidSubscriptionCommand,
    ) -> Result<StartPaidSubscriptionResult, SubscriptionError> {
        // 1. Validate the request
        if !cmd.plan.is_paid() {
            return Err(ValidationError::invalid_format("plan", "the Free plan has no paid subscription").into());
        }
        if cmd.email.trim().is_empty() {
            return Err(ValidationError::empty_field("email").into());
        }
        let price_ref = self
            .catalog
            .price_for(cmd.plan, cmd.billing_cycle)
            .ok_or_else(|| SubscriptionError::UnmappedPlan(format!("{} {}", cmd.plan, cmd.billing_cycle.as_str())))?
            .to_string();

        // 2. Refuse a second live subscription
        let current = self
            .updater
            .repository()
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.user_id.to_string()))?;
        if has_live_paid_subscription(&current) {
            return Err(SubscriptionError::AlreadyExists(cmd.user_id.to_string()));
        }

        // 3. Ensure a provider customer exists and is linked
        let customer_ref = match current.customer_ref {
            Some(existing) => existing,
            None => self.create_and_link_customer(&cmd).await?,
        };

        // 4. Start the provider subscription
        let provider_subscription = self
            .billing
            .create_subscription(CreateSubscriptionRequest {
                customer_ref: customer_ref.clone(),
                price_ref: price_ref.clone(),
                trial_days: cmd.trial_days.filter(|days| *days > 0),
                coupon: cmd.coupon.clone().filter(|c| !c.trim().is_empty()),
                idempotency_key: Some(format!("subscription-{}", cmd.checkout_id)),
            })
            .await
            .map_err(|err| {
                tracing::error!(user_id = %cmd.user_id, price_ref = %price_ref, error = %err, "create subscription failed");
                SubscriptionError::from(err)
            })?;

        tracing::info!(
            user_id = %cmd.user_id,
            plan = %cmd.plan,
            subscription_ref = %provider_subscription.subscription_ref,
            provider_status = %provider_subscription.status,
            "paid subscription started, awaiting provider confirmation"
        );

        Ok(StartPaidSubscriptionResult {
            customer_ref,
            provider_subscription,
        })
    }

    async fn create_and_link_customer(
        &self,
        cmd: &StartPaidSubscriptionCommand,
    ) -> Result<CustomerRef, SubscriptionError> {
        let customer = self
            .billing
            .create_customer(CreateCustomerRequest {
                user_id: cmd.user_id.clone(),
                email: cmd.email.clone(),
                name: cmd.name.clone(),
                idempotency_key: Some(format!("customer-{}", cmd.user_id)),
            })
            .await
            .map_err(|err| {
                tracing::error!(user_id = %cmd.user_id, error = %err, "create customer failed");
                SubscriptionError::from(err)
            })?;

        let now = Timestamp::now();
        let linked = customer.customer_ref.clone();
        self.updater
            .update(&cmd.user_id, |subscription| subscription.link_customer(linked.clone(), now))
            .await?;

        tracing::info!(user_id = %cmd.user_id, customer_ref = %customer.customer_ref, "billing customer linked");
        Ok(customer.customer_ref)
    }
}

/// A provider subscription that still grants, or may again grant, access.
///
/// `incomplete` is excluded: the user may retry checkout, and the abandoned
/// attempt expires on its own.
fn has_live_paid_subscription(subscription: &Subscription) -> bool {
    subscription.subscription_ref.is_some()
        && !subscription.status.is_terminal()
        && subscription.status != SubscriptionStatus::Incomplete
}
