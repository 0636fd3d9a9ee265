//! Strongly-typed identifier value objects.
//!
//! The billing provider owns customer, subscription and payment identifiers;
//! we only ever hold them as opaque, non-empty strings.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting blank input.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Owning account identifier (issued by the auth layer).
    UserId,
    "user_id"
);

string_id!(
    /// Billing-provider customer reference, e.g. `cus_...`.
    CustomerRef,
    "customer_ref"
);

string_id!(
    /// Billing-provider subscription reference, e.g. `sub_...`.
    SubscriptionRef,
    "subscription_ref"
);

string_id!(
    /// Identifier of a single payment attempt, used for history dedup.
    PaymentId,
    "payment_id"
);
