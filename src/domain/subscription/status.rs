//! Subscription status state machine.
//!
//! Statuses mirror the billing provider's lifecycle. The provider is the
//! source of truth, so the table only guards the moves it never makes: out
//! of a terminal status, or back into `Incomplete`. Between the live
//! statuses any move is accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current. Also the status of every Free record.
    Active,

    /// In a provider-managed trial. Counts as active.
    Trialing,

    /// Renewal payment failed; the provider is retrying.
    PastDue,

    /// Ended. Terminal for this provider subscription.
    Canceled,

    /// Created, first payment not yet confirmed.
    Incomplete,

    /// First payment never confirmed. Terminal.
    IncompleteExpired,

    /// Retries exhausted without cancelling.
    Unpaid,

    /// Collection paused by the provider.
    Paused,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 8] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Canceled,
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::IncompleteExpired,
        SubscriptionStatus::Unpaid,
        SubscriptionStatus::Paused,
    ];

    /// The only statuses that count as "currently active".
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
        }
    }

    /// Parses the provider's status string.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses a settled provider subscription moves between.
const LIVE: [SubscriptionStatus; 5] = [
    SubscriptionStatus::Active,
    SubscriptionStatus::Trialing,
    SubscriptionStatus::PastDue,
    SubscriptionStatus::Unpaid,
    SubscriptionStatus::Paused,
];

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Incomplete => vec![Active, Trialing, PastDue, Unpaid, Paused, IncompleteExpired, Canceled],
            Active | Trialing | PastDue | Unpaid | Paused => LIVE
                .into_iter()
                .filter(|status| status != self)
                .chain([Canceled])
                .collect(),
            Canceled | IncompleteExpired => vec![],
        }
    }
}
