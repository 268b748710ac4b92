//! Per-tier cost estimation

use serde::{Deserialize, Serialize};

use crate::config::RateTable;
use crate::error::AdvisorResult;
use crate::models::{CostEstimate, Tier};

/// Prices volumes against a rate table
#[derive(Debug, Clone)]
pub struct CostModel {
    rates: RateTable,
}

impl CostModel {
    pub fn new(rates: RateTable) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// `volume_gb * rate(tier)`; fails for a tier with no configured rate
    pub fn estimate_cost(&self, volume_gb: f64, tier: Tier) -> AdvisorResult<CostEstimate> {
        let rate_per_gb = self.rates.rate(tier)?;
        Ok(CostEstimate {
            tier,
            rate_per_gb,
            volume_gb,
            total_cost: volume_gb * rate_per_gb,
        })
    }

    /// Cost in `current` minus cost in `recommended`; may be negative
    pub fn calculate_savings(
        &self,
        volume_gb: f64,
        current: Tier,
        recommended: Tier,
    ) -> AdvisorResult<f64> {
        let current = self.estimate_cost(volume_gb, current)?;
        let recommended = self.estimate_cost(volume_gb, recommended)?;
        Ok(current.total_cost - recommended.total_cost)
    }
}

/// Cost components for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub ingestion: f64,
    pub storage: f64,
    pub query: f64,
    pub total: f64,
}

impl CostSummary {
    pub fn new(ingestion: f64, storage: f64, query: f64) -> Self {
        Self {
            ingestion,
            storage,
            query,
            total: total_cost(ingestion, storage, query),
        }
    }
}

pub fn total_cost(ingestion: f64, storage: f64, query: f64) -> f64 {
    ingestion + storage + query
}

/// Monthly storage cost now and after applying every tier recommendation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostImpact {
    pub current_monthly_cost: f64,
    pub projected_monthly_cost: f64,
    pub projected_savings: f64,
}

impl CostImpact {
    pub fn new(current_monthly_cost: f64, projected_savings: f64) -> Self {
        let projected_savings = projected_savings.clamp(0.0, current_monthly_cost.max(0.0));
        Self {
            current_monthly_cost,
            projected_monthly_cost: current_monthly_cost - projected_savings,
            projected_savings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdvisorError;

    #[test]
    fn test_savings_hot_to_cold() {
        let model = CostModel::new(RateTable::default());
        let savings = model.calculate_savings(100.0, Tier::Hot, Tier::Cold).unwrap();
        assert!((savings - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_savings_can_be_negative() {
        let model = CostModel::new(RateTable::default());
        let savings = model.calculate_savings(10.0, Tier::Warm, Tier::Hot).unwrap();
        assert!((savings + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_cost() {
        let model = CostModel::new(RateTable::default());
        let estimate = model.estimate_cost(40.0, Tier::Warm).unwrap();
        assert_eq!(estimate.rate_per_gb, 0.5);
        assert!((estimate.total_cost - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_tier_is_an_error_not_zero() {
        let model = CostModel::new(RateTable::new([(Tier::Hot, 2.5), (Tier::Warm, 0.5)]));
        assert!(matches!(
            model.estimate_cost(10.0, Tier::Archive),
            Err(AdvisorError::UnknownTier { tier: Tier::Archive })
        ));
        assert!(model.calculate_savings(10.0, Tier::Hot, Tier::Cold).is_err());
    }

    #[test]
    fn test_total_cost() {
        assert_eq!(total_cost(1.5, 2.0, 0.5), 4.0);
        let summary = CostSummary::new(10.0, 25.0, 5.0);
        assert_eq!(summary.total, 40.0);
    }

    #[test]
    fn test_cost_impact() {
        let impact = CostImpact::new(250.0, 240.0);
        assert_eq!(impact.projected_monthly_cost, 10.0);
        assert_eq!(impact.projected_savings, 240.0);

        let capped = CostImpact::new(10.0, 40.0);
        assert_eq!(capped.projected_savings, 10.0);
        assert_eq!(capped.projected_monthly_cost, 0.0);
    }
}
