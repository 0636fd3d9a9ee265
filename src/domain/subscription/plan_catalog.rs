//! Mapping between provider price references and plans.

use serde::{Deserialize, Serialize};

use super::{BillingCycle, Plan, SubscriptionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMapping {
    pub price_ref: String,
    pub plan: Plan,
    pub cycle: BillingCycle,
}

/// The fixed price → plan table, built from configuration at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanCatalog {
    prices: Vec<PriceMapping>,
}

impl PlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a price. Several prices may map to the same plan and cycle (old
    /// prices keep resolving for existing subscribers); the newest one is
    /// used for new checkouts.
    pub fn with_price(mut self, price_ref: impl Into<String>, plan: Plan, cycle: BillingCycle) -> Self {
        self.prices.push(PriceMapping {
            price_ref: price_ref.into(),
            plan,
            cycle,
        });
        self
    }

    pub fn prices(&self) -> &[PriceMapping] {
        &self.prices
    }

    pub fn resolve(&self, price_ref: &str) -> Result<(Plan, BillingCycle), SubscriptionError> {
        self.prices
            .iter()
            .find(|p| p.price_ref == price_ref)
            .map(|p| (p.plan, p.cycle))
            .ok_or_else(|| SubscriptionError::UnmappedPlan(price_ref.to_string()))
    }

    /// Like [`resolve`](Self::resolve), but an unknown price degrades to Free.
    pub fn resolve_or_free(&self, price_ref: &str) -> (Plan, BillingCycle) {
        match self.resolve(price_ref) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(price_ref = %price_ref, error = %err, "unmapped price, treating as free plan");
                (Plan::Free, BillingCycle::Monthly)
            }
        }
    }

    /// Price to charge for a plan, used when starting or changing a subscription.
    pub fn price_for(&self, plan: Plan, cycle: BillingCycle) -> Option<&str> {
        self.prices
            .iter()
            .rev()
            .find(|p| p.plan == plan && p.cycle == cycle)
            .map(|p| p.price_ref.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new()
            .with_price("price_premium_monthly", Plan::Premium, BillingCycle::Monthly)
            .with_price("price_premium_yearly", Plan::Premium, BillingCycle::Yearly)
            .with_price("price_pro_monthly", Plan::Pro, BillingCycle::Monthly)
    }

    #[test]
    fn resolves_known_price() {
        assert_eq!(
            catalog().resolve("price_premium_yearly").unwrap(),
            (Plan::Premium, BillingCycle::Yearly)
        );
    }

    #[test]
    fn unknown_price_is_unmapped() {
        assert_eq!(
            catalog().resolve("price_unknown_xyz"),
            Err(SubscriptionError::UnmappedPlan("price_unknown_xyz".to_string()))
        );
    }

    #[test]
    fn unknown_price_falls_back_to_free() {
        assert_eq!(catalog().resolve_or_free("price_unknown_xyz").0, Plan::Free);
    }

    #[test]
    fn price_for_finds_plan_and_cycle() {
        assert_eq!(
            catalog().price_for(Plan::Pro, BillingCycle::Monthly),
            Some("price_pro_monthly")
        );
        assert_eq!(catalog().price_for(Plan::Pro, BillingCycle::Yearly), None);
    }

    #[test]
    fn legacy_price_still_resolves_after_replacement() {
        let catalog = catalog().with_price("price_premium_monthly_v2", Plan::Premium, BillingCycle::Monthly);
        assert_eq!(
            catalog.price_for(Plan::Premium, BillingCycle::Monthly),
            Some("price_premium_monthly_v2")
        );
        assert_eq!(
            catalog.resolve("price_premium_monthly").unwrap(),
            (Plan::Premium, BillingCycle::Monthly)
        );
    }
}
