//! Payment history and discount metadata mirrored from the billing provider.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

/// One settled or failed payment attempt. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub amount_cents: i64,
    pub currency: String,
    pub outcome: PaymentOutcome,
    pub occurred_at: Timestamp,
}

/// Append-only list of payment records, unique by payment id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentHistory(Vec<PaymentRecord>);

impl PaymentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record` unless its payment id is already present.
    ///
    /// Returns false for a duplicate delivery.
    pub fn append(&mut self, record: PaymentRecord) -> bool {
        if self.contains(&record.payment_id) {
            return false;
        }
        self.0.push(record);
        true
    }

    pub fn contains(&self, payment_id: &PaymentId) -> bool {
        self.0.iter().any(|r| &r.payment_id == payment_id)
    }

    pub fn records(&self) -> &[PaymentRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PaymentRecord> {
        self.0.last()
    }
}

/// Coupon applied on the provider side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub coupon_id: String,
    pub percent_off: Option<u8>,
    pub amount_off_cents: Option<i64>,
    pub ends_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, outcome: PaymentOutcome) -> PaymentRecord {
        PaymentRecord {
            payment_id: PaymentId::new(id).unwrap(),
            amount_cents: 999,
            currency: "usd".to_string(),
            outcome,
            occurred_at: Timestamp::from_unix_secs(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn append_adds_new_payment() {
        let mut history = PaymentHistory::new();
        assert!(history.append(record("in_1", PaymentOutcome::Succeeded)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn append_ignores_duplicate_payment_id() {
        let mut history = PaymentHistory::new();
        history.append(record("in_1", PaymentOutcome::Succeeded));
        assert!(!history.append(record("in_1", PaymentOutcome::Succeeded)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn duplicate_does_not_overwrite_original() {
        let mut history = PaymentHistory::new();
        history.append(record("in_1", PaymentOutcome::Failed));
        history.append(record("in_1", PaymentOutcome::Succeeded));
        assert_eq!(history.records()[0].outcome, PaymentOutcome::Failed);
    }

    #[test]
    fn history_serializes_as_array() {
        let mut history = PaymentHistory::new();
        history.append(record("in_1", PaymentOutcome::Succeeded));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["paymentId"], "in_1");
        assert_eq!(json[0]["outcome"], "succeeded");
    }
}
