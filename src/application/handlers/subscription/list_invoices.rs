//! ListInvoicesHandler - provider invoices for the user's billing customer.

use std::sync::Arc;

use crate::domain::foundation::UserId;
use crate::domain::subscription::SubscriptionError;
use crate::ports::{BillingClient, Invoice, SubscriptionRepository};

pub const DEFAULT_INVOICE_LIMIT: u8 = 10;
pub const MAX_INVOICE_LIMIT: u8 = 100;

#[derive(Debug, Clone)]
pub struct ListInvoicesQuery {
    pub user_id: UserId,
    pub limit: Option<u8>,
}

pub struct ListInvoicesHandler {
    repository: Arc<dyn SubscriptionRepository>,
    billing: Arc<dyn BillingClient>,
}

impl ListInvoicesHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, billing: Arc<dyn BillingClient>) -> Self {
        Self { repository, billing }
    }

    pub async fn handle(&self, query: ListInvoicesQuery) -> Result<Vec<Invoice>, SubscriptionError> {
        let subscription = self
            .repository
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(query.user_id.to_string()))?;

        // Never billed, nothing to list.
        let Some(customer_ref) = subscription.customer_ref else {
            return Ok(Vec::new());
        };

        let limit = query
            .limit
            .unwrap_or(DEFAULT_INVOICE_LIMIT)
            .clamp(1, MAX_INVOICE_LIMIT);

        self.billing
            .list_invoices(&customer_ref, limit)
            .await
            .map_err(|err| {
                tracing::error!(user_id = %query.user_id, error = %err, "listing invoices failed");
                SubscriptionError::from(err)
            })
    }
}
