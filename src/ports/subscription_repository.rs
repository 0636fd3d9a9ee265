//! Subscription repository port.
//!
//! One record per user, keyed by `user_id`. Writes are compare-and-swap on
//! the record's `revision`, which is the only concurrency primitive the
//! application layer relies on.

use async_trait::async_trait;

use crate::domain::foundation::{CustomerRef, SubscriptionRef, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the user already has a subscription
    /// - `Validation` if a provider ref is already used by another user
    /// - `Infrastructure` on storage failure
    async fn insert(&self, subscription: &Subscription) -> Result<(), SubscriptionError>;

    /// Replaces the stored record if its revision still equals
    /// `subscription.revision`. Returns the new revision.
    ///
    /// # Errors
    ///
    /// - `Conflict` if another writer got there first
    /// - `NotFound` if no record exists for the user
    /// - `Validation` if a provider ref is already used by another user
    async fn update(&self, subscription: &Subscription) -> Result<u64, SubscriptionError>;

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, SubscriptionError>;

    async fn find_by_customer_ref(
        &self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Subscription>, SubscriptionError>;

    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<Option<Subscription>, SubscriptionError>;
}
