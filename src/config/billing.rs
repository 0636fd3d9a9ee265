//! Billing provider configuration (Stripe)

use secrecy::SecretString;
use serde::Deserialize;

use crate::adapters::stripe::StripeConfig;
use crate::domain::subscription::{BillingCycle, Plan, PlanCatalog};

use super::error::ValidationError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingConfig {
    pub stripe_api_key: String,

    /// Webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: String,

    /// Override for the Stripe API host, e.g. a local stub
    pub stripe_api_base_url: Option<String>,

    pub premium_monthly_price_id: String,
    pub premium_yearly_price_id: String,
    pub pro_monthly_price_id: String,
    pub pro_yearly_price_id: String,

    /// Refuse test-mode webhook events
    #[serde(default)]
    pub require_livemode: bool,
}

impl BillingConfig {
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    pub fn api_key(&self) -> SecretString {
        SecretString::new(self.stripe_api_key.clone())
    }

    pub fn webhook_secret(&self) -> SecretString {
        SecretString::new(self.stripe_webhook_secret.clone())
    }

    fn prices(&self) -> [(&'static str, &str, Plan, BillingCycle); 4] {
        [
            ("PREMIUM_MONTHLY_PRICE_ID", self.premium_monthly_price_id.as_str(), Plan::Premium, BillingCycle::Monthly),
            ("PREMIUM_YEARLY_PRICE_ID", self.premium_yearly_price_id.as_str(), Plan::Premium, BillingCycle::Yearly),
            ("PRO_MONTHLY_PRICE_ID", self.pro_monthly_price_id.as_str(), Plan::Pro, BillingCycle::Monthly),
            ("PRO_YEARLY_PRICE_ID", self.pro_yearly_price_id.as_str(), Plan::Pro, BillingCycle::Yearly),
        ]
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }
        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }

        let mut seen: Vec<&str> = Vec::new();
        for (name, price, _, _) in self.prices() {
            if price.trim().is_empty() {
                return Err(ValidationError::MissingRequired(name));
            }
            if seen.contains(&price) {
                return Err(ValidationError::DuplicatePriceId(price.to_string()));
            }
            seen.push(price);
        }
        Ok(())
    }
}

impl From<&BillingConfig> for PlanCatalog {
    fn from(config: &BillingConfig) -> Self {
        config
            .prices()
            .into_iter()
            .fold(PlanCatalog::new(), |catalog, (_, price, plan, cycle)| {
                catalog.with_price(price, plan, cycle)
            })
    }
}

impl From<&BillingConfig> for StripeConfig {
    fn from(config: &BillingConfig) -> Self {
        let stripe = StripeConfig::new(config.api_key());
        match &config.stripe_api_base_url {
            Some(url) => stripe.with_base_url(url.as_str()),
            None => stripe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> BillingConfig {
        BillingConfig {
            stripe_api_key: "sk_test_abcd1234".to_string(),
            stripe_webhook_secret: "whsec_xyz789".to_string(),
            stripe_api_base_url: None,
            premium_monthly_price_id: "price_pm".to_string(),
            premium_yearly_price_id: "price_py".to_string(),
            pro_monthly_price_id: "price_rm".to_string(),
            pro_yearly_price_id: "price_ry".to_string(),
            require_livemode: false,
        }
    }

    #[test]
    fn test_mode_detection() {
        let config = valid();
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_secrets() {
        assert_eq!(
            BillingConfig::default().validate(),
            Err(ValidationError::MissingRequired("STRIPE_API_KEY"))
        );

        let config = BillingConfig {
            stripe_webhook_secret: String::new(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET")));
    }

    #[test]
    fn test_validation_key_prefixes() {
        let publishable = BillingConfig {
            stripe_api_key: "pk_test_xxx".to_string(),
            ..valid()
        };
        assert_eq!(publishable.validate(), Err(ValidationError::InvalidStripeKey));

        let bad_secret = BillingConfig {
            stripe_webhook_secret: "secret_xxx".to_string(),
            ..valid()
        };
        assert_eq!(bad_secret.validate(), Err(ValidationError::InvalidStripeWebhookSecret));
    }

    #[test]
    fn test_validation_missing_price() {
        let config = BillingConfig {
            pro_yearly_price_id: " ".to_string(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ValidationError::MissingRequired("PRO_YEARLY_PRICE_ID")));
    }

    #[test]
    fn test_validation_duplicate_price() {
        let config = BillingConfig {
            pro_monthly_price_id: "price_pm".to_string(),
            ..valid()
        };
        assert_eq!(config.validate(), Err(ValidationError::DuplicatePriceId("price_pm".to_string())));
    }

    #[test]
    fn catalog_built_from_all_four_prices() {
        let catalog = PlanCatalog::from(&valid());

        assert_eq!(catalog.prices().len(), 4);
        assert_eq!(catalog.resolve("price_py").unwrap(), (Plan::Premium, BillingCycle::Yearly));
        assert_eq!(catalog.resolve("price_rm").unwrap(), (Plan::Pro, BillingCycle::Monthly));
    }

    #[test]
    fn stripe_config_uses_base_url_override() {
        let config = BillingConfig {
            stripe_api_base_url: Some("http://localhost:12111/".to_string()),
            ..valid()
        };

        assert_eq!(StripeConfig::from(&config).api_base_url(), "http://localhost:12111");
        assert_eq!(StripeConfig::from(&valid()).api_base_url(), "https://api.stripe.com");
    }
}
