//! Stripe API objects as they appear in webhook payloads and API responses.
//!
//! Only the fields we read are modelled; everything else is ignored by serde.
//! Newer API versions moved the billing period onto subscription items, so
//! both locations are optional here.

use serde::{Deserialize, Serialize};

use crate::domain::subscription::SubscriptionStatus;

// ════════════════════════════════════════════════════════════════════════════════
// Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// `evt_...`
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix seconds.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Objects
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// `cus_...`
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// `sub_...`
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<i64>,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    pub discount: Option<StripeDiscount>,
    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
    /// Present only when expanded on creation.
    pub latest_invoice: Option<serde_json::Value>,
}

impl StripeSubscription {
    pub fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items.data.first()
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item().map(|item| item.price.id.as_str())
    }

    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| self.first_item().and_then(|item| item.current_period_start))
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.first_item().and_then(|item| item.current_period_end))
    }

    /// Client secret of the first payment, when `latest_invoice.payment_intent`
    /// was expanded.
    pub fn client_secret(&self) -> Option<String> {
        self.latest_invoice
            .as_ref()
            .and_then(|invoice| invoice.get("payment_intent"))
            .and_then(|intent| intent.get("client_secret"))
            .and_then(|secret| secret.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    /// `si_...`
    pub id: String,
    pub price: StripePrice,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    /// `price_...`
    pub id: String,
    pub unit_amount: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeDiscount {
    pub coupon: StripeCoupon,
    /// Unix seconds; `None` for forever coupons.
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCoupon {
    pub id: String,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoice {
    /// `in_...`
    pub id: String,
    pub customer: String,
    pub subscription: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: String,
    #[serde(default)]
    pub attempt_count: i32,
    pub hosted_invoice_url: Option<String>,
    pub created: i64,
    pub status_transitions: Option<StripeInvoiceTransitions>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeInvoiceTransitions {
    pub paid_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

/// Error body returned by the Stripe API on non-2xx responses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeErrorBody {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeApiError {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: Option<String>,
}

/// Maps a Stripe status string. Unknown statuses yield `None`.
pub fn parse_status(status: &str) -> Option<SubscriptionStatus> {
    SubscriptionStatus::parse(status)
}
