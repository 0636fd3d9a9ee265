//! PostgreSQL implementation of SubscriptionRepository.
//!
//! One row per user in `subscriptions`. Usage counters, payment history and
//! the discount are JSONB columns; everything queried on is a plain column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::foundation::{CustomerRef, SubscriptionRef, Timestamp, UserId, ValidationError};
use crate::domain::subscription::{
    BillingCycle, Discount, EventVersion, PaymentHistory, Plan, Subscription, SubscriptionError,
    SubscriptionStatus, Usage,
};
use crate::ports::SubscriptionRepository;

const SELECT_COLUMNS: &str = r#"
    SELECT user_id, customer_ref, subscription_ref, plan, status, billing_cycle,
           current_period_start, current_period_end, cancel_at_period_end,
           trial_start, trial_end, canceled_at, usage, payment_history, discount,
           last_event_version, revision, created_at, updated_at
    FROM subscriptions
"#;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Subscription>, SubscriptionError> {
        let sql = format!("{} WHERE {} = $1", SELECT_COLUMNS, column);
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SubscriptionError::infrastructure(format!("Failed to load subscription: {}", e)))?;

        row.map(Subscription::try_from).transpose()
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    user_id: String,
    customer_ref: Option<String>,
    subscription_ref: Option<String>,
    plan: String,
    status: String,
    billing_cycle: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    usage: Json<Usage>,
    payment_history: Json<PaymentHistory>,
    discount: Option<Json<Discount>>,
    last_event_version: Option<i64>,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = SubscriptionError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let plan = Plan::parse(&row.plan).ok_or_else(|| corrupt("plan", &row.plan))?;
        let status = SubscriptionStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?;
        let billing_cycle =
            BillingCycle::parse(&row.billing_cycle).ok_or_else(|| corrupt("billing_cycle", &row.billing_cycle))?;

        Ok(Subscription {
            user_id: UserId::new(row.user_id)?,
            customer_ref: row.customer_ref.map(CustomerRef::new).transpose()?,
            subscription_ref: row.subscription_ref.map(SubscriptionRef::new).transpose()?,
            plan,
            status,
            billing_cycle,
            current_period_start: row.current_period_start.map(Timestamp::from_datetime),
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            trial_start: row.trial_start.map(Timestamp::from_datetime),
            trial_end: row.trial_end.map(Timestamp::from_datetime),
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            usage: row.usage.0,
            payment_history: row.payment_history.0,
            discount: row.discount.map(|d| d.0),
            last_event_version: row.last_event_version.map(EventVersion::new),
            revision: u64::try_from(row.revision).map_err(|_| corrupt("revision", &row.revision.to_string()))?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn corrupt(column: &str, value: &str) -> SubscriptionError {
    SubscriptionError::infrastructure(format!("Invalid {} value in database: {}", column, value))
}

fn revision_param(revision: u64) -> Result<i64, SubscriptionError> {
    i64::try_from(revision).map_err(|_| SubscriptionError::infrastructure("revision out of range"))
}

/// Maps a write failure, turning constraint violations into domain errors.
fn map_write_error(err: sqlx::Error, user_id: &UserId, operation: &str) -> SubscriptionError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some("subscriptions_pkey") => return SubscriptionError::AlreadyExists(user_id.to_string()),
            Some("subscriptions_customer_ref_key") => {
                return ValidationError::invalid_format("customer_ref", "already linked to another user").into()
            }
            Some("subscriptions_subscription_ref_key") => {
                return ValidationError::invalid_format("subscription_ref", "already linked to another user").into()
            }
            _ => {}
        }
    }
    SubscriptionError::infrastructure(format!("Failed to {} subscription: {}", operation, err))
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), SubscriptionError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                user_id, customer_ref, subscription_ref, plan, status, billing_cycle,
                current_period_start, current_period_end, cancel_at_period_end,
                trial_start, trial_end, canceled_at, usage, payment_history, discount,
                last_event_version, revision, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(subscription.user_id.as_str())
        .bind(subscription.customer_ref.as_ref().map(CustomerRef::as_str))
        .bind(subscription.subscription_ref.as_ref().map(SubscriptionRef::as_str))
        .bind(subscription.plan.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start.map(DateTime::<Utc>::from))
        .bind(subscription.current_period_end.map(DateTime::<Utc>::from))
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.trial_start.map(DateTime::<Utc>::from))
        .bind(subscription.trial_end.map(DateTime::<Utc>::from))
        .bind(subscription.canceled_at.map(DateTime::<Utc>::from))
        .bind(Json(&subscription.usage))
        .bind(Json(&subscription.payment_history))
        .bind(subscription.discount.as_ref().map(Json))
        .bind(subscription.last_event_version.map(|v| v.value()))
        .bind(revision_param(subscription.revision)?)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &subscription.user_id, "insert"))?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<u64, SubscriptionError> {
        let expected = revision_param(subscription.revision)?;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                customer_ref = $2,
                subscription_ref = $3,
                plan = $4,
                status = $5,
                billing_cycle = $6,
                current_period_start = $7,
                current_period_end = $8,
                cancel_at_period_end = $9,
                trial_start = $10,
                trial_end = $11,
                canceled_at = $12,
                usage = $13,
                payment_history = $14,
                discount = $15,
                last_event_version = $16,
                updated_at = $17,
                revision = revision + 1
            WHERE user_id = $1 AND revision = $18
            "#,
        )
        .bind(subscription.user_id.as_str())
        .bind(subscription.customer_ref.as_ref().map(CustomerRef::as_str))
        .bind(subscription.subscription_ref.as_ref().map(SubscriptionRef::as_str))
        .bind(subscription.plan.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start.map(DateTime::<Utc>::from))
        .bind(subscription.current_period_end.map(DateTime::<Utc>::from))
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.trial_start.map(DateTime::<Utc>::from))
        .bind(subscription.trial_end.map(DateTime::<Utc>::from))
        .bind(subscription.canceled_at.map(DateTime::<Utc>::from))
        .bind(Json(&subscription.usage))
        .bind(Json(&subscription.payment_history))
        .bind(subscription.discount.as_ref().map(Json))
        .bind(subscription.last_event_version.map(|v| v.value()))
        .bind(subscription.updated_at.as_datetime())
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &subscription.user_id, "update"))?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT revision FROM subscriptions WHERE user_id = $1")
                .bind(subscription.user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SubscriptionError::infrastructure(format!("Failed to check subscription: {}", e)))?;

            return Err(match exists {
                Some(_) => SubscriptionError::Conflict {
                    user_id: subscription.user_id.to_string(),
                    expected: subscription.revision,
                },
                None => SubscriptionError::not_found(subscription.user_id.to_string()),
            });
        }

        Ok(subscription.revision + 1)
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, SubscriptionError> {
        self.find_one("user_id", user_id.as_str()).await
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &CustomerRef,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        self.find_one("customer_ref", customer_ref.as_str()).await
    }

    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        self.find_one("subscription_ref", subscription_ref.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::Feature;
    use std::collections::BTreeMap;

    fn row() -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            user_id: "user-1".to_string(),
            customer_ref: Some("cus_1".to_string()),
            subscription_ref: Some("sub_1".to_string()),
            plan: "premium".to_string(),
            status: "past_due".to_string(),
            billing_cycle: "yearly".to_string(),
            current_period_start: Some(now),
            current_period_end: None,
            cancel_at_period_end: true,
            trial_start: None,
            trial_end: None,
            canceled_at: None,
            usage: Json(Usage {
                current_period: BTreeMap::from([(Feature::AiChatMessages, 4)]),
                last_reset: Timestamp::from_datetime(now),
                lifetime: BTreeMap::from([(Feature::AiChatMessages, 40)]),
            }),
            payment_history: Json(PaymentHistory::new()),
            discount: None,
            last_event_version: Some(1_700_000_000),
            revision: 7,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_subscription() {
        let sub = Subscription::try_from(row()).unwrap();

        assert_eq!(sub.user_id.as_str(), "user-1");
        assert_eq!(sub.plan, Plan::Premium);
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.billing_cycle, BillingCycle::Yearly);
        assert_eq!(sub.usage.used(Feature::AiChatMessages), 4);
        assert_eq!(sub.last_event_version, Some(EventVersion::new(1_700_000_000)));
        assert_eq!(sub.revision, 7);
    }

    #[test]
    fn unknown_plan_is_infrastructure_error() {
        let mut bad = row();
        bad.plan = "platinum".to_string();

        let result = Subscription::try_from(bad);
        assert!(matches!(result, Err(SubscriptionError::Infrastructure(_))));
    }

    #[test]
    fn negative_revision_is_rejected() {
        let mut bad = row();
        bad.revision = -1;

        assert!(Subscription::try_from(bad).is_err());
    }

    #[test]
    fn non_constraint_errors_are_infrastructure() {
        let err = map_write_error(sqlx::Error::RowNotFound, &UserId::new("user-1").unwrap(), "update");
        assert!(matches!(err, SubscriptionError::Infrastructure(_)));
    }
}
