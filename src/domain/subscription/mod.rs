//! Subscription domain module.
//!
//! Billing state per user, plan entitlements, usage quotas and reconciliation
//! of provider billing events.
//!
//! # Module Structure
//!
//! - `plan` / `feature` - plan tiers, metered features, boolean capabilities
//! - `entitlements` - the plan → limit table
//! - `status` - provider status state machine
//! - `usage` / `meter` - counters and lazy period rollover
//! - `aggregate` - the Subscription record
//! - `billing_event` / `plan_catalog` / `reconciler` - provider event intake
//! - `access_gate` - allow/deny decisions

mod access_gate;
mod aggregate;
pub(crate) mod billing_event;
mod entitlements;
mod errors;
mod feature;
mod meter;
mod payment;
mod plan;
mod plan_catalog;
mod reconciler;
mod status;
mod usage;

pub use access_gate::{AccessDecision, EntitlementDenied, FeatureAccessGate};
pub use aggregate::Subscription;
pub use billing_event::{BillingEventKind, BillingEventSnapshot, EventVersion, PaymentDetails};
pub use entitlements::{EntitlementPolicy, FeatureLimit, PlanEntitlements};
pub use errors::SubscriptionError;
pub use feature::{Capability, Feature};
pub use meter::{UsageMeter, DEFAULT_FREE_PERIOD_DAYS};
pub use payment::{Discount, PaymentHistory, PaymentOutcome, PaymentRecord};
pub use plan::{BillingCycle, Plan};
pub use plan_catalog::{PlanCatalog, PriceMapping};
pub use reconciler::{BillingEventReconciler, ReconcileOutcome};
pub use status::SubscriptionStatus;
pub use usage::Usage;
