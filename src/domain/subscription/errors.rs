//! Subscription error taxonomy.
//!
//! Entitlement denials are not errors; see `AccessDecision`.

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionRef, ValidationError};

use super::{EventVersion, SubscriptionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Malformed input. Never retried.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A snapshot asked for a transition the lifecycle forbids.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    #[error("subscription not found: {0}")]
    NotFound(String),

    #[error("subscription already exists for user {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency check failed; retry with a fresh read.
    #[error("concurrent modification of subscription for user {user_id} (expected revision {expected})")]
    Conflict { user_id: String, expected: u64 },

    /// Event is not newer than the last one applied. Logged and dropped.
    #[error("stale billing event {incoming} (last applied {applied})")]
    StaleEvent {
        incoming: EventVersion,
        applied: EventVersion,
    },

    /// Deletion for a subscription the record has already moved past.
    #[error("billing event targets superseded subscription {0}")]
    SupersededSubscription(SubscriptionRef),

    /// Price reference not in the catalog. Callers fall back to Free.
    #[error("no plan mapped to price '{0}'")]
    UnmappedPlan(String),

    /// Snapshot lacks a field needed to apply it; the provider should redeliver.
    #[error("billing event missing required field '{0}'")]
    IncompleteEvent(&'static str),

    #[error("billing provider error: {message}")]
    Billing { message: String, retryable: bool },

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SubscriptionError::NotFound(what.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns true if the same request may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubscriptionError::Conflict { .. }
            | SubscriptionError::IncompleteEvent(_)
            | SubscriptionError::Infrastructure(_) => true,
            SubscriptionError::Billing { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::Validation(err) => ErrorCode::from(err),
            SubscriptionError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::NotFound(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::AlreadyExists(_) => ErrorCode::SubscriptionAlreadyExists,
            SubscriptionError::Conflict { .. } => ErrorCode::ConcurrentModification,
            SubscriptionError::StaleEvent { .. } | SubscriptionError::SupersededSubscription(_) => {
                ErrorCode::StaleEvent
            }
            SubscriptionError::UnmappedPlan(_) => ErrorCode::UnmappedPlan,
            SubscriptionError::IncompleteEvent(_) => ErrorCode::IncompleteEvent,
            SubscriptionError::Billing { .. } => ErrorCode::BillingProviderError,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::SubscriptionNotFound => SubscriptionError::NotFound(err.message),
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => {
                let field = err.details.get("field").cloned().unwrap_or_default();
                SubscriptionError::Validation(ValidationError::invalid_format(field, err.message))
            }
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
