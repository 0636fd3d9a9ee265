//! Subscription handlers.
//!
//! ## Commands
//! - Initializing the Free record at account creation
//! - Recording metered usage
//! - Applying verified billing events
//! - Starting, changing, cancelling and resuming paid subscriptions
//!
//! ## Queries
//! - Feature access checks
//! - Account view
//! - Invoice listing

mod apply_billing_event;
mod cancel_subscription;
mod change_plan;
mod check_feature_access;
mod get_subscription;
mod initialize_free_subscription;
mod list_invoices;
mod record_usage;
mod resume_subscription;
mod start_paid_subscription;

use crate::domain::foundation::{StateMachine, SubscriptionRef, ValidationError};
use crate::domain::subscription::{Subscription, SubscriptionError};

// Commands
pub use apply_billing_event::{
    ApplyBillingEventCommand, ApplyBillingEventHandler, ApplyBillingEventResult, EventDisposition,
};
pub use cancel_subscription::{CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult};
pub use change_plan::{ChangePlanCommand, ChangePlanHandler, ChangePlanResult};
pub use initialize_free_subscription::{
    InitializeFreeSubscriptionCommand, InitializeFreeSubscriptionHandler, InitializeFreeSubscriptionResult,
};
pub use record_usage::{RecordUsageCommand, RecordUsageHandler, RecordUsageResult};
pub use resume_subscription::{ResumeSubscriptionCommand, ResumeSubscriptionHandler, ResumeSubscriptionResult};
pub use start_paid_subscription::{
    StartPaidSubscriptionCommand, StartPaidSubscriptionHandler, StartPaidSubscriptionResult,
};

// Queries
pub use check_feature_access::{CheckFeatureAccessHandler, CheckFeatureAccessQuery, CheckFeatureAccessResult};
pub use get_subscription::{FeatureUsageView, GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionView};
pub use list_invoices::{ListInvoicesHandler, ListInvoicesQuery, DEFAULT_INVOICE_LIMIT, MAX_INVOICE_LIMIT};

/// The provider subscription a user-initiated change would act on.
fn require_provider_subscription(subscription: &Subscription) -> Result<&SubscriptionRef, SubscriptionError> {
    match &subscription.subscription_ref {
        Some(subscription_ref) if !subscription.status.is_terminal() => Ok(subscription_ref),
        _ => Err(ValidationError::invalid_format("subscription_ref", "no live paid subscription").into()),
    }
}
