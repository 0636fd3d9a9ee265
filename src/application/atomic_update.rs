//! Optimistic read-modify-write of a single subscription record.
//!
//! Every mutation of a subscription goes through [`AtomicUpdater::update`]:
//! load, apply a synchronous closure to an owned copy, write back only if
//! something changed, and retry from a fresh read when another writer won.
//! No external call may happen inside the closure.

use std::sync::Arc;

use crate::domain::foundation::UserId;
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

/// Attempts used when configuration does not say otherwise.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct AtomicUpdater {
    repository: Arc<dyn SubscriptionRepository>,
    max_attempts: u32,
}

impl AtomicUpdater {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, max_attempts: u32) -> Self {
        Self {
            repository,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn repository(&self) -> &Arc<dyn SubscriptionRepository> {
        &self.repository
    }

    /// Applies `apply` to the user's record atomically.
    ///
    /// Returns the closure's value and the record as stored afterwards. An
    /// error from the closure aborts without writing. `Conflict` is returned
    /// once all attempts lose the race.
    pub async fn update<T, F>(&self, user_id: &UserId, mut apply: F) -> Result<(T, Subscription), SubscriptionError>
    where
        F: FnMut(&mut Subscription) -> Result<T, SubscriptionError> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let current = self
                .repository
                .find_by_user_id(user_id)
                .await?
                .ok_or_else(|| SubscriptionError::not_found(user_id.to_string()))?;

            let mut working = current.clone();
            let value = apply(&mut working)?;
            if working == current {
                return Ok((value, working));
            }

            match self.repository.update(&working).await {
                Ok(revision) => {
                    working.revision = revision;
                    return Ok((value, working));
                }
                Err(SubscriptionError::Conflict { .. }) if attempt < self.max_attempts => {
                    tracing::debug!(user_id = %user_id, attempt, "subscription write conflict, retrying");
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                Err(err) => {
                    if matches!(err, SubscriptionError::Conflict { .. }) {
                        tracing::warn!(user_id = %user_id, attempts = attempt, "subscription write conflict, giving up");
                    }
                    return Err(err);
                }
            }
        }
    }
}
