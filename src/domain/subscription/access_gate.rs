//! Feature access gate.
//!
//! The one place request handlers ask "may this user do this now?". A denial
//! is a normal answer, not an error, and never touches usage counters.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{Timestamp, ValidationError};

use super::{EntitlementPolicy, Feature, FeatureLimit, Plan, Subscription, SubscriptionError, UsageMeter};

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Deny(EntitlementDenied),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AccessDecision::Deny(_))
    }

    pub fn into_result(self) -> Result<(), EntitlementDenied> {
        match self {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny(reason) => Err(reason),
        }
    }
}

/// Why access was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntitlementDenied {
    /// The current plan lacks the capability behind this feature.
    NotEntitled { required_plan: Plan },

    /// The period quota cannot cover the requested amount.
    LimitExceeded { remaining: u32 },
}

impl EntitlementDenied {
    pub fn user_message(&self) -> String {
        match self {
            EntitlementDenied::NotEntitled { required_plan } => {
                format!("This feature requires the {} plan.", required_plan)
            }
            EntitlementDenied::LimitExceeded { remaining: 0 } => {
                "You've used your allowance for this billing period.".to_string()
            }
            EntitlementDenied::LimitExceeded { remaining } => {
                format!("Only {} left for this billing period.", remaining)
            }
        }
    }
}

impl fmt::Display for EntitlementDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureAccessGate {
    meter: UsageMeter,
}

impl FeatureAccessGate {
    pub fn new(meter: UsageMeter) -> Self {
        Self { meter }
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    /// Decides whether `amount` units of `feature` may be used now.
    ///
    /// May roll the usage period over; never increments a counter.
    pub fn check_access(
        &self,
        subscription: &mut Subscription,
        feature: Feature,
        amount: u32,
        now: Timestamp,
    ) -> Result<AccessDecision, SubscriptionError> {
        if amount == 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::from(u32::MAX), 0).into());
        }

        if let Some(capability) = feature.required_capability() {
            if !EntitlementPolicy::has_boolean_feature(subscription.effective_plan(), capability) {
                return Ok(AccessDecision::Deny(EntitlementDenied::NotEntitled {
                    required_plan: EntitlementPolicy::minimum_plan_for(capability),
                }));
            }
        }

        if !self.meter.can_use(subscription, feature, amount, now) {
            let remaining = match self.meter.remaining(subscription, feature) {
                FeatureLimit::Limited(n) => n,
                FeatureLimit::Unlimited => u32::MAX,
            };
            return Ok(AccessDecision::Deny(EntitlementDenied::LimitExceeded { remaining }));
        }

        Ok(AccessDecision::Allow)
    }

    /// Check and record in one step: the indivisible unit callers run inside
    /// a single atomic update of the record.
    pub fn try_consume(
        &self,
        subscription: &mut Subscription,
        feature: Feature,
        amount: u32,
        now: Timestamp,
    ) -> Result<AccessDecision, SubscriptionError> {
        let decision = self.check_access(subscription, feature, amount, now)?;
        if decision.is_allowed() {
            self.meter.record_usage(subscription, feature, amount, now);
        }
        Ok(decision)
    }
}
