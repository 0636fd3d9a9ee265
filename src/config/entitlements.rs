//! Entitlement engine tuning

use serde::Deserialize;

use crate::application::DEFAULT_MAX_UPDATE_ATTEMPTS;
use crate::domain::subscription::{UsageMeter, DEFAULT_FREE_PERIOD_DAYS};

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementsConfig {
    /// Compare-and-swap attempts before a write gives up with `Conflict`
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,

    /// Length of the rolling usage window for records without a billing period
    #[serde(default = "default_free_period_days")]
    pub free_period_days: i64,
}

impl EntitlementsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=20).contains(&self.max_update_attempts) {
            return Err(ValidationError::InvalidUpdateAttempts);
        }
        if !(1..=366).contains(&self.free_period_days) {
            return Err(ValidationError::InvalidFreePeriod);
        }
        Ok(())
    }

    pub fn usage_meter(&self) -> UsageMeter {
        UsageMeter::new(self.free_period_days)
    }
}

impl Default for EntitlementsConfig {
    fn default() -> Self {
        Self {
            max_update_attempts: default_max_update_attempts(),
            free_period_days: default_free_period_days(),
        }
    }
}

fn default_max_update_attempts() -> u32 {
    DEFAULT_MAX_UPDATE_ATTEMPTS
}

fn default_free_period_days() -> i64 {
    DEFAULT_FREE_PERIOD_DAYS
}
