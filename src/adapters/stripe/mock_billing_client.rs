//! Mock billing client for tests.
//!
//! Keeps provider-side customers, subscriptions and invoices in memory, records
//! every call and lets tests inject errors per method or for the next call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::foundation::{CustomerRef, SubscriptionRef};
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::{
    BillingClient, BillingCustomer, BillingError, CreateCustomerRequest, CreateSubscriptionRequest, Invoice,
    ProviderSubscription,
};

#[derive(Clone, Default)]
pub struct MockBillingClient {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    next_id: u32,
    customers: HashMap<String, BillingCustomer>,
    subscriptions: HashMap<String, ProviderSubscription>,
    /// Price each subscription is currently on.
    prices: HashMap<String, String>,
    invoices: Vec<(CustomerRef, Invoice)>,
    /// Responses keyed by idempotency key, replayed like the provider does.
    replayed_customers: HashMap<String, BillingCustomer>,
    replayed_subscriptions: HashMap<String, ProviderSubscription>,
    next_error: Option<BillingError>,
    method_errors: HashMap<String, BillingError>,
    call_log: Vec<MethodCall>,
}

/// A recorded call, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockBillingClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════════════════

    /// Seeds a provider subscription, e.g. one created before the test began.
    pub fn add_subscription(&self, subscription: ProviderSubscription, price_ref: &str) {
        let mut state = self.state();
        let key = subscription.subscription_ref.to_string();
        state.prices.insert(key.clone(), price_ref.to_string());
        state.subscriptions.insert(key, subscription);
    }

    pub fn add_invoice(&self, customer_ref: CustomerRef, invoice: Invoice) {
        self.state().invoices.push((customer_ref, invoice));
    }

    /// Fails the next call, whichever method it is.
    pub fn set_error(&self, error: BillingError) {
        self.state().next_error = Some(error);
    }

    /// Fails every call to `method` until cleared.
    pub fn set_method_error(&self, method: &str, error: BillingError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().call_log.iter().filter(|c| c.method == method).count()
    }

    pub fn subscription(&self, subscription_ref: &SubscriptionRef) -> Option<ProviderSubscription> {
        self.state().subscriptions.get(subscription_ref.as_str()).cloned()
    }

    pub fn price_of(&self, subscription_ref: &SubscriptionRef) -> Option<String> {
        self.state().prices.get(subscription_ref.as_str()).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal
    // ════════════════════════════════════════════════════════════════════════════

    fn begin(&self, method: &str, args: Vec<String>) -> Result<MutexGuard<'_, MockState>, BillingError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(state)
    }

    fn with_subscription<F>(
        &self,
        method: &str,
        subscription_ref: &SubscriptionRef,
        extra: Option<String>,
        change: F,
    ) -> Result<ProviderSubscription, BillingError>
    where
        F: FnOnce(&mut MockState, &mut ProviderSubscription),
    {
        let mut args = vec![subscription_ref.to_string()];
        args.extend(extra);
        let mut state = self.begin(method, args)?;

        let mut subscription = state
            .subscriptions
            .get(subscription_ref.as_str())
            .cloned()
            .ok_or_else(|| BillingError::not_found("subscription"))?;
        change(&mut *state, &mut subscription);
        state
            .subscriptions
            .insert(subscription_ref.to_string(), subscription.clone());
        Ok(subscription)
    }
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_mock_{}", prefix, self.next_id)
    }
}

fn mock_ref<T>(result: Result<T, crate::domain::foundation::ValidationError>) -> Result<T, BillingError> {
    result.map_err(|e| BillingError::provider(e.to_string()))
}

#[async_trait]
impl BillingClient for MockBillingClient {
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<BillingCustomer, BillingError> {
        let mut state = self.begin(
            "create_customer",
            vec![request.user_id.to_string(), request.email.clone()],
        )?;

        if let Some(previous) = request
            .idempotency_key
            .as_ref()
            .and_then(|key| state.replayed_customers.get(key))
        {
            return Ok(previous.clone());
        }

        let customer = BillingCustomer {
            customer_ref: mock_ref(CustomerRef::new(state.next_id("cus")))?,
            email: request.email,
        };
        state
            .customers
            .insert(customer.customer_ref.to_string(), customer.clone());
        if let Some(key) = request.idempotency_key {
            state.replayed_customers.insert(key, customer.clone());
        }
        Ok(customer)
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, BillingError> {
        let mut state = self.begin(
            "create_subscription",
            vec![request.customer_ref.to_string(), request.price_ref.clone()],
        )?;

        if let Some(previous) = request
            .idempotency_key
            .as_ref()
            .and_then(|key| state.replayed_subscriptions.get(key))
        {
            return Ok(previous.clone());
        }

        let id = state.next_id("sub");
        let status = if request.trial_days.unwrap_or(0) > 0 {
            SubscriptionStatus::Trialing
        } else {
            SubscriptionStatus::Incomplete
        };
        let client_secret = (status == SubscriptionStatus::Incomplete).then(|| format!("pi_{}_secret", id));
        let subscription = ProviderSubscription {
            subscription_ref: mock_ref(SubscriptionRef::new(id.clone()))?,
            customer_ref: request.customer_ref,
            status,
            cancel_at_period_end: false,
            client_secret,
        };
        state.prices.insert(id.clone(), request.price_ref);
        state.subscriptions.insert(id, subscription.clone());
        if let Some(key) = request.idempotency_key {
            state.replayed_subscriptions.insert(key, subscription.clone());
        }
        Ok(subscription)
    }

    async fn update_subscription_price(
        &self,
        subscription_ref: &SubscriptionRef,
        price_ref: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        self.with_subscription(
            "update_subscription_price",
            subscription_ref,
            Some(price_ref.to_string()),
            |state, subscription| {
                state
                    .prices
                    .insert(subscription.subscription_ref.to_string(), price_ref.to_string());
            },
        )
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_ref: &SubscriptionRef,
        cancel: bool,
    ) -> Result<ProviderSubscription, BillingError> {
        self.with_subscription(
            "set_cancel_at_period_end",
            subscription_ref,
            Some(cancel.to_string()),
            |_, subscription| subscription.cancel_at_period_end = cancel,
        )
    }

    async fn cancel_subscription_now(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<ProviderSubscription, BillingError> {
        self.with_subscription("cancel_subscription_now", subscription_ref, None, |_, subscription| {
            subscription.status = SubscriptionStatus::Canceled;
            subscription.cancel_at_period_end = false;
        })
    }

    async fn list_invoices(&self, customer_ref: &CustomerRef, limit: u8) -> Result<Vec<Invoice>, BillingError> {
        let state = self.begin("list_invoices", vec![customer_ref.to_string(), limit.to_string()])?;

        let mut invoices: Vec<Invoice> = state
            .invoices
            .iter()
            .filter(|(owner, _)| owner == customer_ref)
            .map(|(_, invoice)| invoice.clone())
            .collect();
        invoices.sort_by(|a, b| b.created.cmp(&a.created));
        invoices.truncate(usize::from(limit));
        Ok(invoices)
    }
}
