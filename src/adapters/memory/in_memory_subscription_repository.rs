//! In-memory subscription repository.
//!
//! Used by tests and local runs without a database. The compare-and-swap in
//! `update` happens under a single write lock, so it offers the same
//! per-record atomicity as the Postgres adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{CustomerRef, SubscriptionRef, UserId, ValidationError};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionRepository {
    records: Arc<RwLock<HashMap<UserId, Subscription>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Provider refs must stay unique across users.
    fn ensure_refs_unique(
        records: &HashMap<UserId, Subscription>,
        subscription: &Subscription,
    ) -> Result<(), SubscriptionError> {
        for other in records.values().filter(|s| s.user_id != subscription.user_id) {
            if subscription.customer_ref.is_some() && other.customer_ref == subscription.customer_ref {
                return Err(ValidationError::invalid_format("customer_ref", "already linked to another user").into());
            }
            if subscription.subscription_ref.is_some() && other.subscription_ref == subscription.subscription_ref {
                return Err(
                    ValidationError::invalid_format("subscription_ref", "already linked to another user").into(),
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        let mut records = self.records.write().await;
        if records.contains_key(&subscription.user_id) {
            return Err(SubscriptionError::AlreadyExists(subscription.user_id.to_string()));
        }
        Self::ensure_refs_unique(&records, subscription)?;
        records.insert(subscription.user_id.clone(), subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<u64, SubscriptionError> {
        let mut records = self.records.write().await;
        let stored = records
            .get(&subscription.user_id)
            .ok_or_else(|| SubscriptionError::not_found(subscription.user_id.to_string()))?;

        if stored.revision != subscription.revision {
            return Err(SubscriptionError::Conflict {
                user_id: subscription.user_id.to_string(),
                expected: subscription.revision,
            });
        }
        Self::ensure_refs_unique(&records, subscription)?;

        let mut next = subscription.clone();
        next.revision = subscription.revision + 1;
        let revision = next.revision;
        records.insert(next.user_id.clone(), next);
        Ok(revision)
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, SubscriptionError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|s| s.customer_ref.as_ref() == Some(customer_ref))
            .cloned())
    }

    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|s| s.subscription_ref.as_ref() == Some(subscription_ref))
            .cloned())
    }
}
