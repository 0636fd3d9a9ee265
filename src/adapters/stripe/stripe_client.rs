//! Stripe implementation of the `BillingClient` port.
//!
//! Form-encoded requests against the Stripe REST API with basic auth. Only
//! responses are mapped here; no subscription state is written.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::domain::foundation::{CustomerRef, SubscriptionRef};
use crate::ports::{
    BillingClient, BillingCustomer, BillingError, BillingErrorCode, CreateCustomerRequest,
    CreateSubscriptionRequest, Invoice, ProviderSubscription,
};

use super::webhook_types::{
    parse_status, StripeCustomer, StripeErrorBody, StripeInvoice, StripeList, StripeSubscription,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeConfig {
    api_key: SecretString,
    api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Points the client at another host, e.g. a local stub in tests.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

pub struct StripeBillingClient {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.config.api_base_url, path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, operation: &'static str) -> Result<T, BillingError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(operation, error = %e, "stripe request failed");
            BillingError::network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = error_from_response(status, &body);
            tracing::error!(
                operation,
                status = status.as_u16(),
                code = %err.code,
                provider_code = ?err.provider_code,
                "stripe api error"
            );
            return Err(err);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BillingError::provider(format!("failed to parse stripe response: {}", e)))
    }

    async fn fetch_subscription(&self, subscription_ref: &SubscriptionRef) -> Result<StripeSubscription, BillingError> {
        let request = self.request(Method::GET, &format!("/v1/subscriptions/{}", subscription_ref));
        self.execute(request, "get_subscription").await
    }
}

#[async_trait]
impl BillingClient for StripeBillingClient {
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<BillingCustomer, BillingError> {
        let mut params = vec![
            ("email", request.email.clone()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];
        if let Some(name) = &request.name {
            params.push(("name", name.clone()));
        }

        let mut http = self.request(Method::POST, "/v1/customers").form(&params);
        if let Some(key) = &request.idempotency_key {
            http = http.header("Idempotency-Key", key);
        }

        let customer: StripeCustomer = self.execute(http, "create_customer").await?;
        Ok(BillingCustomer {
            customer_ref: CustomerRef::new(customer.id).map_err(|e| BillingError::provider(e.to_string()))?,
            email: customer.email.unwrap_or(request.email),
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, BillingError> {
        let mut params = vec![
            ("customer", request.customer_ref.to_string()),
            ("items[0][price]", request.price_ref.clone()),
            ("payment_behavior", "default_incomplete".to_string()),
            ("expand[]", "latest_invoice.payment_intent".to_string()),
        ];
        if let Some(days) = request.trial_days {
            params.push(("trial_period_days", days.to_string()));
        }
        if let Some(coupon) = &request.coupon {
            params.push(("discounts[0][coupon]", coupon.clone()));
        }

        let mut http = self.request(Method::POST, "/v1/subscriptions").form(&params);
        if let Some(key) = &request.idempotency_key {
            http = http.header("Idempotency-Key", key);
        }

        let subscription: StripeSubscription = self.execute(http, "create_subscription").await?;
        to_provider_subscription(subscription)
    }

    async fn update_subscription_price(
        &self,
        subscription_ref: &SubscriptionRef,
        price_ref: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        let current = self.fetch_subscription(subscription_ref).await?;
        let item = current
            .first_item()
            .ok_or_else(|| BillingError::invalid_request("subscription has no items"))?;

        let params = [
            ("items[0][id]", item.id.clone()),
            ("items[0][price]", price_ref.to_string()),
            ("proration_behavior", "create_prorations".to_string()),
        ];
        let http = self
            .request(Method::POST, &format!("/v1/subscriptions/{}", subscription_ref))
            .form(&params);
        let updated: StripeSubscription = self.execute(http, "update_subscription_price").await?;
        to_provider_subscription(updated)
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_ref: &SubscriptionRef,
        cancel: bool,
    ) -> Result<ProviderSubscription, BillingError> {
        let http = self
            .request(Method::POST, &format!("/v1/subscriptions/{}", subscription_ref))
            .form(&[("cancel_at_period_end", cancel.to_string())]);
        let updated: StripeSubscription = self.execute(http, "set_cancel_at_period_end").await?;
        to_provider_subscription(updated)
    }

    async fn cancel_subscription_now(
        &self,
        subscription_ref: &SubscriptionRef,
    ) -> Result<ProviderSubscription, BillingError> {
        let http = self.request(Method::DELETE, &format!("/v1/subscriptions/{}", subscription_ref));
        let canceled: StripeSubscription = self.execute(http, "cancel_subscription_now").await?;
        to_provider_subscription(canceled)
    }

    async fn list_invoices(&self, customer_ref: &CustomerRef, limit: u8) -> Result<Vec<Invoice>, BillingError> {
        let http = self
            .request(Method::GET, "/v1/invoices")
            .query(&[("customer", customer_ref.to_string()), ("limit", limit.to_string())]);
        let list: StripeList<StripeInvoice> = self.execute(http, "list_invoices").await?;

        Ok(list
            .data
            .into_iter()
            .map(|invoice| Invoice {
                id: invoice.id,
                amount_due_cents: invoice.amount_due,
                amount_paid_cents: invoice.amount_paid,
                currency: invoice.currency,
                status: invoice.status,
                hosted_invoice_url: invoice.hosted_invoice_url,
                created: invoice.created,
            })
            .collect())
    }
}

fn to_provider_subscription(subscription: StripeSubscription) -> Result<ProviderSubscription, BillingError> {
    let status = parse_status(&subscription.status)
        .ok_or_else(|| BillingError::provider(format!("unknown subscription status '{}'", subscription.status)))?;
    let client_secret = subscription.client_secret();

    Ok(ProviderSubscription {
        subscription_ref: SubscriptionRef::new(subscription.id).map_err(|e| BillingError::provider(e.to_string()))?,
        customer_ref: CustomerRef::new(subscription.customer).map_err(|e| BillingError::provider(e.to_string()))?,
        status,
        cancel_at_period_end: subscription.cancel_at_period_end,
        client_secret,
    })
}

/// Maps a non-2xx Stripe response to a `BillingError`.
pub(crate) fn error_from_response(status: StatusCode, body: &str) -> BillingError {
    let parsed = serde_json::from_str::<StripeErrorBody>(body).ok().map(|b| b.error);
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| format!("stripe returned {}", status));

    let code = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BillingErrorCode::AuthenticationError,
        StatusCode::PAYMENT_REQUIRED => BillingErrorCode::CardDeclined,
        StatusCode::NOT_FOUND => BillingErrorCode::NotFound,
        StatusCode::TOO_MANY_REQUESTS => BillingErrorCode::RateLimitExceeded,
        s if s.is_client_error() => match parsed.as_ref().and_then(|e| e.error_type.as_deref()) {
            Some("card_error") => BillingErrorCode::CardDeclined,
            _ => BillingErrorCode::InvalidRequest,
        },
        _ => BillingErrorCode::ProviderError,
    };

    let mut err = BillingError::new(code, message);
    if let Some(provider_code) = parsed.and_then(|e| e.decline_code.or(e.code)) {
        err = err.with_provider_code(provider_code);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::subscription::SubscriptionStatus;
    use axum::extract::Form;
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn stub(router: Router) -> StripeBillingClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        StripeBillingClient::new(
            StripeConfig::new(SecretString::new("sk_test_123".to_string())).with_base_url(format!("http://{}", addr)),
        )
    }

    fn subscription_json(status: &str) -> Value {
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": status,
            "cancel_at_period_end": false,
            "items": {"data": [{"id": "si_1", "price": {"id": "price_premium_monthly"}}]},
            "latest_invoice": {"payment_intent": {"client_secret": "pi_secret"}}
        })
    }

    // ══════════════════════════════════════════════════════════════
    // Error Mapping
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn card_error_maps_to_declined_with_decline_code() {
        let body = r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds","message":"Insufficient funds"}}"#;
        let err = error_from_response(StatusCode::PAYMENT_REQUIRED, body);

        assert_eq!(err.code, BillingErrorCode::CardDeclined);
        assert_eq!(err.provider_code.as_deref(), Some("insufficient_funds"));
        assert_eq!(err.message, "Insufficient funds");
        assert!(!err.retryable);
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        assert!(error_from_response(StatusCode::TOO_MANY_REQUESTS, "").retryable);
        assert!(error_from_response(StatusCode::BAD_GATEWAY, "<html>").retryable);
    }

    #[test]
    fn unparseable_body_keeps_status_in_message() {
        let err = error_from_response(StatusCode::NOT_FOUND, "nope");
        assert_eq!(err.code, BillingErrorCode::NotFound);
        assert!(err.message.contains("404"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = StripeConfig::new(SecretString::new("sk".to_string())).with_base_url("http://localhost:1/");
        assert_eq!(config.api_base_url, "http://localhost:1");
    }

    // ══════════════════════════════════════════════════════════════
    // Requests Against a Local Stub
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn create_customer_sends_metadata() {
        let router = Router::new().route(
            "/v1/customers",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form.get("metadata[user_id]").map(String::as_str), Some("user-1"));
                Json(json!({"id": "cus_new", "email": form.get("email")}))
            }),
        );
        let client = stub(router).await;

        let customer = client
            .create_customer(CreateCustomerRequest {
                user_id: UserId::new("user-1").unwrap(),
                email: "ana@example.com".to_string(),
                name: None,
                idempotency_key: Some("customer-user-1".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(customer.customer_ref.as_str(), "cus_new");
        assert_eq!(customer.email, "ana@example.com");
    }

    #[tokio::test]
    async fn create_subscription_returns_client_secret() {
        let router = Router::new().route(
            "/v1/subscriptions",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form.get("items[0][price]").map(String::as_str), Some("price_premium_monthly"));
                Json(subscription_json("incomplete"))
            }),
        );
        let client = stub(router).await;

        let sub = client
            .create_subscription(CreateSubscriptionRequest {
                customer_ref: CustomerRef::new("cus_1").unwrap(),
                price_ref: "price_premium_monthly".to_string(),
                trial_days: None,
                coupon: None,
                idempotency_key: None,
            })
            .await
            .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Incomplete);
        assert_eq!(sub.client_secret.as_deref(), Some("pi_secret"));
    }

    #[tokio::test]
    async fn cancel_now_uses_delete() {
        let router = Router::new().route(
            "/v1/subscriptions/:id",
            delete(|| async { Json(subscription_json("canceled")) }),
        );
        let client = stub(router).await;

        let sub = client
            .cancel_subscription_now(&SubscriptionRef::new("sub_1").unwrap())
            .await
            .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn api_error_is_mapped() {
        let router = Router::new().route(
            "/v1/subscriptions/:id",
            delete(|| async {
                (
                    axum::http::StatusCode::NOT_FOUND,
                    Json(json!({"error": {"type": "invalid_request_error", "code": "resource_missing", "message": "No such subscription"}})),
                )
            }),
        );
        let client = stub(router).await;

        let err = client
            .cancel_subscription_now(&SubscriptionRef::new("sub_x").unwrap())
            .await
            .unwrap_err();

        assert_eq!(err.code, BillingErrorCode::NotFound);
        assert_eq!(err.provider_code.as_deref(), Some("resource_missing"));
    }

    #[tokio::test]
    async fn unreachable_host_is_retryable_network_error() {
        let client = StripeBillingClient::new(
            StripeConfig::new(SecretString::new("sk".to_string())).with_base_url("http://127.0.0.1:9"),
        );

        let err = client
            .list_invoices(&CustomerRef::new("cus_1").unwrap(), 5)
            .await
            .unwrap_err();

        assert_eq!(err.code, BillingErrorCode::NetworkError);
        assert!(err.retryable);
    }
}
