//! InitializeFreeSubscriptionHandler - creates the Free record at account creation.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone)]
pub struct InitializeFreeSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct InitializeFreeSubscriptionResult {
    pub subscription: Subscription,
}

pub struct InitializeFreeSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
}

impl InitializeFreeSubscriptionHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(
        &self,
        cmd: InitializeFreeSubscriptionCommand,
    ) -> Result<InitializeFreeSubscriptionResult, SubscriptionError> {
        if self.repository.find_by_user_id(&cmd.user_id).await?.is_some() {
            return Err(SubscriptionError::AlreadyExists(cmd.user_id.to_string()));
        }

        let subscription = Subscription::initialize_free(cmd.user_id, Timestamp::now());
        self.repository.insert(&subscription).await?;

        tracing::info!(user_id = %subscription.user_id, "free subscription initialized");
        Ok(InitializeFreeSubscriptionResult { subscription })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::domain::subscription::{Plan, SubscriptionStatus};

    fn command(id: &str) -> InitializeFreeSubscriptionCommand {
        InitializeFreeSubscriptionCommand {
            user_id: UserId::new(id).unwrap(),
        }
    }

    #[tokio::test]
    async fn creates_free_active_record() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let handler = InitializeFreeSubscriptionHandler::new(repo.clone());

        let result = handler.handle(command("user-1")).await.unwrap();

        assert_eq!(result.subscription.plan, Plan::Free);
        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        assert!(repo
            .find_by_user_id(&UserId::new("user-1").unwrap())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rejects_second_initialization() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let handler = InitializeFreeSubscriptionHandler::new(repo);

        handler.handle(command("user-1")).await.unwrap();
        let result = handler.handle(command("user-1")).await;

        assert!(matches!(result, Err(SubscriptionError::AlreadyExists(_))));
    }
}
