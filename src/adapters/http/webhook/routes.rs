//! Axum router for the billing webhook.

use axum::routing::post;
use axum::Router;

use super::handlers::{handle_billing_webhook, WebhookAppState};

pub const WEBHOOK_PATH: &str = "/webhooks/billing";

/// Create the webhook router.
///
/// # Routes
/// - `POST /webhooks/billing` - signed provider events, no user authentication
pub fn webhook_router() -> Router<WebhookAppState> {
    Router::new().route(WEBHOOK_PATH, post(handle_billing_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::adapters::stripe::{sign_payload, StripeWebhookVerifier};
    use crate::application::{ApplyBillingEventHandler, AtomicUpdater};
    use crate::domain::foundation::{CustomerRef, Timestamp, UserId};
    use crate::domain::subscription::{
        BillingCycle, BillingEventReconciler, Plan, PlanCatalog, Subscription, SubscriptionStatus,
    };
    use crate::ports::SubscriptionRepository;

    const SECRET: &str = "whsec_test";

    async fn app() -> (Router, InMemorySubscriptionRepository) {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = Subscription::initialize_free(UserId::new("user-1").unwrap(), Timestamp::now());
        sub.link_customer(CustomerRef::new("cus_1").unwrap(), Timestamp::now())
            .unwrap();
        repo.insert(&sub).await.unwrap();

        let catalog = PlanCatalog::new().with_price("price_premium_monthly", Plan::Premium, BillingCycle::Monthly);
        let handler = ApplyBillingEventHandler::new(
            AtomicUpdater::new(Arc::new(repo.clone()), 3),
            BillingEventReconciler::new(catalog),
        );
        let verifier = StripeWebhookVerifier::new(SecretString::new(SECRET.to_string()));

        (webhook_router().with_state(WebhookAppState::new(verifier, handler)), repo)
    }

    fn subscription_event(event_type: &str, customer: &str) -> Value {
        json!({
            "id": "evt_1",
            "type": event_type,
            "created": chrono::Utc::now().timestamp(),
            "livemode": false,
            "data": {"object": {
                "id": "sub_1",
                "customer": customer,
                "status": "active",
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000,
                "cancel_at_period_end": false,
                "items": {"data": [{"id": "si_1", "price": {"id": "price_premium_monthly"}}]}
            }}
        })
    }

    fn signed_request(body: &Value, secret: &str) -> Request<Body> {
        let payload = serde_json::to_vec(body).unwrap();
        let header = sign_payload(secret, chrono::Utc::now().timestamp(), &payload);
        Request::builder()
            .method("POST")
            .uri(WEBHOOK_PATH)
            .header("Stripe-Signature", header)
            .header("content-type", "application/json")
            .body(Body::from(payload))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn signed_update_is_applied() {
        let (app, repo) = app().await;

        let response = app
            .oneshot(signed_request(&subscription_event("customer.subscription.updated", "cus_1"), SECRET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["outcome"], "applied");

        let stored = repo
            .find_by_user_id(&UserId::new("user-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.plan, Plan::Premium);
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized() {
        let (app, _) = app().await;
        let request = Request::builder()
            .method("POST")
            .uri(WEBHOOK_PATH)
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "MISSING_SIGNATURE");
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized() {
        let (app, repo) = app().await;

        let response = app
            .oneshot(signed_request(
                &subscription_event("customer.subscription.updated", "cus_1"),
                "whsec_other",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let stored = repo
            .find_by_user_id(&UserId::new("user-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.plan, Plan::Free);
    }

    #[tokio::test]
    async fn unhandled_type_is_acknowledged() {
        let (app, _) = app().await;
        let body = json!({
            "id": "evt_2",
            "type": "customer.created",
            "created": chrono::Utc::now().timestamp(),
            "data": {"object": {"id": "cus_1"}}
        });

        let response = app.oneshot(signed_request(&body, SECRET)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["outcome"], "ignored");
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let (app, _) = app().await;

        let response = app
            .oneshot(signed_request(&subscription_event("customer.subscription.updated", "cus_unknown"), SECRET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let (app, _) = app().await;
        let body = json!({
            "id": "evt_3",
            "type": "customer.subscription.updated",
            "created": chrono::Utc::now().timestamp(),
            "data": {"object": {"id": "sub_1"}}
        });

        let response = app.oneshot(signed_request(&body, SECRET)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
