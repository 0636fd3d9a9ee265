//! Foundation module - shared domain primitives.
//!
//! Identifiers, timestamps, error codes and the state machine trait used by
//! the subscription domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{CustomerRef, PaymentId, SubscriptionRef, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
