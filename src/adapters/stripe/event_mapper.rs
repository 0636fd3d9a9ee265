//! Converts verified Stripe events into billing event snapshots.
//!
//! Subscription events carry the whole subscription object, so the snapshot is
//! a straight copy. The event's `created` second is the ordering version.

use crate::domain::foundation::{CustomerRef, PaymentId, SubscriptionRef, Timestamp};
use crate::domain::subscription::{
    BillingEventKind, BillingEventSnapshot, Discount, EventVersion, PaymentDetails,
};

use super::webhook_types::{parse_status, StripeInvoice, StripeSubscription, StripeWebhookEvent};
use super::webhook_verifier::WebhookError;

/// Maps a Stripe event type to the kind of snapshot it produces.
pub fn event_kind(event_type: &str) -> Option<BillingEventKind> {
    match event_type {
        "customer.subscription.created" => Some(BillingEventKind::SubscriptionCreated),
        "customer.subscription.updated" => Some(BillingEventKind::SubscriptionUpdated),
        "customer.subscription.deleted" => Some(BillingEventKind::SubscriptionDeleted),
        "invoice.payment_succeeded" | "invoice.paid" => Some(BillingEventKind::PaymentSucceeded),
        "invoice.payment_failed" => Some(BillingEventKind::PaymentFailed),
        _ => None,
    }
}

/// Builds the snapshot for `event`, or `None` if we do not handle its type.
pub fn to_snapshot(event: &StripeWebhookEvent) -> Result<Option<BillingEventSnapshot>, WebhookError> {
    let Some(kind) = event_kind(&event.event_type) else {
        return Ok(None);
    };

    let snapshot = if kind.is_payment() {
        let invoice: StripeInvoice = serde_json::from_value(event.data.object.clone())
            .map_err(|e| WebhookError::ParseError(format!("invalid invoice: {}", e)))?;
        from_invoice(event, kind, &invoice)?
    } else {
        let subscription: StripeSubscription = serde_json::from_value(event.data.object.clone())
            .map_err(|e| WebhookError::ParseError(format!("invalid subscription: {}", e)))?;
        from_subscription(event, kind, &subscription)?
    };

    Ok(Some(snapshot))
}

fn from_subscription(
    event: &StripeWebhookEvent,
    kind: BillingEventKind,
    subscription: &StripeSubscription,
) -> Result<BillingEventSnapshot, WebhookError> {
    let status = parse_status(&subscription.status);
    if status.is_none() {
        tracing::warn!(event_id = %event.id, status = %subscription.status, "unknown subscription status");
    }

    Ok(BillingEventSnapshot {
        event_id: event.id.clone(),
        kind,
        customer_ref: Some(customer_ref(&subscription.customer)?),
        subscription_ref: Some(
            SubscriptionRef::new(subscription.id.clone()).map_err(|_| WebhookError::MissingField("id"))?,
        ),
        status,
        current_period_start: timestamp(subscription.period_start(), "current_period_start")?,
        current_period_end: timestamp(subscription.period_end(), "current_period_end")?,
        cancel_at_period_end: subscription.cancel_at_period_end,
        canceled_at: timestamp(subscription.canceled_at, "canceled_at")?,
        trial_start: timestamp(subscription.trial_start, "trial_start")?,
        trial_end: timestamp(subscription.trial_end, "trial_end")?,
        price_ref: subscription.price_id().map(str::to_string),
        discount: match &subscription.discount {
            Some(discount) => Some(Discount {
                coupon_id: discount.coupon.id.clone(),
                percent_off: discount
                    .coupon
                    .percent_off
                    .map(|pct| pct.round().clamp(0.0, 100.0) as u8),
                amount_off_cents: discount.coupon.amount_off,
                ends_at: timestamp(discount.end, "discount.end")?,
            }),
            None => None,
        },
        payment: None,
        version: EventVersion::new(event.created),
    })
}

fn from_invoice(
    event: &StripeWebhookEvent,
    kind: BillingEventKind,
    invoice: &StripeInvoice,
) -> Result<BillingEventSnapshot, WebhookError> {
    // `invoice.paid` and `invoice.payment_succeeded` both fire for one payment
    // and share the invoice id. Each failed attempt gets its own id.
    let (payment_id, amount_cents, occurred_at) = match kind {
        BillingEventKind::PaymentFailed => (
            format!("{}-attempt-{}", invoice.id, invoice.attempt_count.max(1)),
            invoice.amount_due,
            event.created,
        ),
        _ => (
            invoice.id.clone(),
            invoice.amount_paid,
            invoice
                .status_transitions
                .as_ref()
                .and_then(|t| t.paid_at)
                .unwrap_or(event.created),
        ),
    };

    let subscription_ref = match invoice.subscription.as_deref() {
        Some(id) => Some(SubscriptionRef::new(id).map_err(|_| WebhookError::MissingField("subscription"))?),
        None => None,
    };

    Ok(BillingEventSnapshot {
        event_id: event.id.clone(),
        kind,
        customer_ref: Some(customer_ref(&invoice.customer)?),
        subscription_ref,
        status: None,
        current_period_start: None,
        current_period_end: None,
        cancel_at_period_end: false,
        canceled_at: None,
        trial_start: None,
        trial_end: None,
        price_ref: None,
        discount: None,
        payment: Some(PaymentDetails {
            payment_id: PaymentId::new(payment_id).map_err(|_| WebhookError::MissingField("id"))?,
            amount_cents,
            currency: invoice.currency.clone(),
            occurred_at: unix_timestamp(occurred_at, "paid_at")?,
        }),
        version: EventVersion::new(event.created),
    })
}

fn customer_ref(raw: &str) -> Result<CustomerRef, WebhookError> {
    CustomerRef::new(raw).map_err(|_| WebhookError::MissingField("customer"))
}

fn timestamp(secs: Option<i64>, field: &'static str) -> Result<Option<Timestamp>, WebhookError> {
    secs.map(|s| unix_timestamp(s, field)).transpose()
}

fn unix_timestamp(secs: i64, field: &'static str) -> Result<Timestamp, WebhookError> {
    Timestamp::from_unix_secs(secs).ok_or_else(|| WebhookError::ParseError(format!("invalid {}", field)))
}
