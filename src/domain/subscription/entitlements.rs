//! Entitlement policy: the single table mapping plans to feature limits.
//!
//! Limits are never persisted. Every check derives them from the plan at the
//! moment of use, so changing this table changes behaviour for every user on
//! their next request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{Capability, Feature, Plan};

/// Per-period quota for a metered feature.
///
/// On the wire a limit is an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FeatureLimit {
    Limited(u32),
    Unlimited,
}

impl FeatureLimit {
    /// Wire sentinel for [`FeatureLimit::Unlimited`].
    pub const UNLIMITED_SENTINEL: i64 = -1;

    pub fn is_unlimited(&self) -> bool {
        matches!(self, FeatureLimit::Unlimited)
    }

    /// True if `amount` more units fit on top of `used`.
    pub fn admits(&self, used: u64, amount: u64) -> bool {
        match self {
            FeatureLimit::Unlimited => true,
            FeatureLimit::Limited(max) => used.saturating_add(amount) <= u64::from(*max),
        }
    }

    /// Headroom left after `used` units, floored at zero.
    pub fn remaining_after(&self, used: u64) -> FeatureLimit {
        match self {
            FeatureLimit::Unlimited => FeatureLimit::Unlimited,
            FeatureLimit::Limited(max) => {
                let left = u64::from(*max).saturating_sub(used);
                FeatureLimit::Limited(u32::try_from(left).unwrap_or(u32::MAX))
            }
        }
    }

    pub fn as_i64(&self) -> i64 {
        i64::from(*self)
    }
}

impl From<FeatureLimit> for i64 {
    fn from(limit: FeatureLimit) -> Self {
        match limit {
            FeatureLimit::Unlimited => FeatureLimit::UNLIMITED_SENTINEL,
            FeatureLimit::Limited(n) => i64::from(n),
        }
    }
}

impl TryFrom<i64> for FeatureLimit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == FeatureLimit::UNLIMITED_SENTINEL {
            return Ok(FeatureLimit::Unlimited);
        }
        u32::try_from(value)
            .map(FeatureLimit::Limited)
            .map_err(|_| format!("invalid feature limit {}", value))
    }
}

impl fmt::Display for FeatureLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureLimit::Unlimited => f.write_str("unlimited"),
            FeatureLimit::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// The plan → entitlement table.
///
/// | Feature              | Free | Premium | Pro       |
/// |----------------------|------|---------|-----------|
/// | aiChatMessages       | 10   | 500     | unlimited |
/// | customQuizzes        | 3    | 50      | unlimited |
/// | offlineDownloads     | -    | 25      | 100       |
/// | pronunciationReviews | -    | -       | unlimited |
///
/// | Capability         | Free | Premium | Pro |
/// |--------------------|------|---------|-----|
/// | offlineMode        | no   | yes     | yes |
/// | pronunciationCoach | no   | no      | yes |
/// | adFree             | no   | yes     | yes |
///
/// A feature missing from a plan's row has limit zero.
pub struct EntitlementPolicy;

impl EntitlementPolicy {
    pub fn limit_for(plan: Plan, feature: Feature) -> FeatureLimit {
        Self::listed_limit(plan, feature).unwrap_or(FeatureLimit::Limited(0))
    }

    pub fn has_boolean_feature(plan: Plan, capability: Capability) -> bool {
        match capability {
            Capability::OfflineMode | Capability::AdFree => plan.is_paid(),
            Capability::PronunciationCoach => plan == Plan::Pro,
        }
    }

    /// Lowest plan that grants `capability`.
    pub fn minimum_plan_for(capability: Capability) -> Plan {
        Plan::ALL
            .into_iter()
            .find(|plan| Self::has_boolean_feature(*plan, capability))
            .unwrap_or(Plan::Pro)
    }

    fn listed_limit(plan: Plan, feature: Feature) -> Option<FeatureLimit> {
        use FeatureLimit::{Limited, Unlimited};

        match (plan, feature) {
            (Plan::Free, Feature::AiChatMessages) => Some(Limited(10)),
            (Plan::Free, Feature::CustomQuizzes) => Some(Limited(3)),

            (Plan::Premium, Feature::AiChatMessages) => Some(Limited(500)),
            (Plan::Premium, Feature::CustomQuizzes) => Some(Limited(50)),
            (Plan::Premium, Feature::OfflineDownloads) => Some(Limited(25)),

            (Plan::Pro, Feature::AiChatMessages) => Some(Unlimited),
            (Plan::Pro, Feature::CustomQuizzes) => Some(Unlimited),
            (Plan::Pro, Feature::OfflineDownloads) => Some(Limited(100)),
            (Plan::Pro, Feature::PronunciationReviews) => Some(Unlimited),

            _ => None,
        }
    }
}

/// Everything a plan grants, for display to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntitlements {
    pub plan: Plan,
    pub limits: BTreeMap<Feature, FeatureLimit>,
    pub capabilities: Vec<Capability>,
}

impl PlanEntitlements {
    pub fn for_plan(plan: Plan) -> Self {
        Self {
            plan,
            limits: Feature::ALL
                .into_iter()
                .map(|feature| (feature, EntitlementPolicy::limit_for(plan, feature)))
                .collect(),
            capabilities: Capability::ALL
                .into_iter()
                .filter(|cap| EntitlementPolicy::has_boolean_feature(plan, *cap))
                .collect(),
        }
    }
}
