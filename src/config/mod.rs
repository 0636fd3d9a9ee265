//! Application configuration module
//!
//! Loaded from environment variables with the `LINGUA` prefix; nested values
//! use `__` as separator. A `.env` file is read first when present.
//!
//! # Example
//!
//! ```no_run
//! use lingua_subscriptions::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod entitlements;
mod error;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use entitlements::EntitlementsConfig;
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub billing: BillingConfig,

    #[serde(default)]
    pub entitlements: EntitlementsConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// - `LINGUA__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `LINGUA__BILLING__PRO_YEARLY_PRICE_ID=...` -> `billing.pro_yearly_price_id = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().prefix("LINGUA").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate every section, plus rules spanning sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.billing.validate()?;
        self.entitlements.validate()?;

        if self.is_production() && self.billing.is_test_mode() {
            return Err(ValidationError::TestKeyInProduction);
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
