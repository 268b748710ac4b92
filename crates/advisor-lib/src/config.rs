//! Engine configuration
//!
//! Thresholds, tier cutoffs and the per-GB rate table. Every field has a
//! default so a partial file deserializes; `validate` must pass before an
//! engine is built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, AdvisorResult};
use crate::models::{Tier, TierStrategy};

/// Detection and recommendation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Percentage deviation from baseline that raises a deviation anomaly
    #[serde(default = "default_deviation_threshold_percent")]
    pub deviation_threshold_percent: f64,

    /// Largest tolerated interval between consecutive samples
    #[serde(default = "default_max_gap_minutes")]
    pub max_gap_minutes: f64,

    /// Standard deviations above the trailing mean that make a spike
    #[serde(default = "default_spike_sigma")]
    pub spike_sigma: f64,

    /// Daily average volume above which ingestion is flagged
    #[serde(default = "default_high_ingestion_threshold_gb")]
    pub high_ingestion_threshold_gb: f64,

    /// Average query cost above which query optimization is suggested
    #[serde(default = "default_query_cost_threshold")]
    pub query_cost_threshold: f64,

    /// Standard deviations above the cross-source mean volume that single
    /// out a source for table optimization
    #[serde(default = "default_table_outlier_sigma")]
    pub table_outlier_sigma: f64,
}

fn default_deviation_threshold_percent() -> f64 {
    50.0
}

fn default_max_gap_minutes() -> f64 {
    10.0
}

fn default_spike_sigma() -> f64 {
    3.0
}

fn default_high_ingestion_threshold_gb() -> f64 {
    100.0
}

fn default_query_cost_threshold() -> f64 {
    50.0
}

fn default_table_outlier_sigma() -> f64 {
    2.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            deviation_threshold_percent: default_deviation_threshold_percent(),
            max_gap_minutes: default_max_gap_minutes(),
            spike_sigma: default_spike_sigma(),
            high_ingestion_threshold_gb: default_high_ingestion_threshold_gb(),
            query_cost_threshold: default_query_cost_threshold(),
            table_outlier_sigma: default_table_outlier_sigma(),
        }
    }
}

/// Tier classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default)]
    pub strategy: TierStrategy,

    #[serde(default = "default_hot_max_age_days")]
    pub hot_max_age_days: u32,

    #[serde(default = "default_warm_max_age_days")]
    pub warm_max_age_days: u32,

    #[serde(default = "default_cold_max_age_days")]
    pub cold_max_age_days: u32,

    /// Daily GB below which a source belongs in cold storage
    #[serde(default = "default_cold_below_gb")]
    pub cold_below_gb: f64,

    /// Daily GB from which a source belongs in hot storage
    #[serde(default = "default_hot_from_gb")]
    pub hot_from_gb: f64,
}

fn default_hot_max_age_days() -> u32 {
    30
}

fn default_warm_max_age_days() -> u32 {
    90
}

fn default_cold_max_age_days() -> u32 {
    365
}

fn default_cold_below_gb() -> f64 {
    1.0
}

fn default_hot_from_gb() -> f64 {
    10.0
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            strategy: TierStrategy::default(),
            hot_max_age_days: default_hot_max_age_days(),
            warm_max_age_days: default_warm_max_age_days(),
            cold_max_age_days: default_cold_max_age_days(),
            cold_below_gb: default_cold_below_gb(),
            hot_from_gb: default_hot_from_gb(),
        }
    }
}

/// Per-GB cost for each storage tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable {
    rates: BTreeMap<Tier, f64>,
}

impl RateTable {
    pub fn new(rates: impl IntoIterator<Item = (Tier, f64)>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
        }
    }

    /// Rate for a tier; a missing entry is an error, never zero
    pub fn rate(&self, tier: Tier) -> AdvisorResult<f64> {
        self.rates
            .get(&tier)
            .copied()
            .ok_or(AdvisorError::UnknownTier { tier })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, f64)> + '_ {
        self.rates.iter().map(|(tier, rate)| (*tier, *rate))
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new([
            (Tier::Hot, 2.5),
            (Tier::Warm, 0.5),
            (Tier::Cold, 0.1),
            (Tier::Archive, 0.02),
        ])
    }
}

/// Complete configuration consumed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub tiers: TierConfig,

    #[serde(default)]
    pub rates: RateTable,

    /// Days a daily volume is projected over when estimating savings
    #[serde(default = "default_billing_period_days")]
    pub billing_period_days: f64,

    /// Separately billed ingestion charge per GB (zero when priced into tier rates)
    #[serde(default)]
    pub ingestion_rate_per_gb: f64,
}

fn default_billing_period_days() -> f64 {
    30.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            tiers: TierConfig::default(),
            rates: RateTable::default(),
            billing_period_days: default_billing_period_days(),
            ingestion_rate_per_gb: 0.0,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine must not run with
    pub fn validate(&self) -> AdvisorResult<()> {
        let t = &self.thresholds;
        require_positive("deviation_threshold_percent", t.deviation_threshold_percent)?;
        require_positive("max_gap_minutes", t.max_gap_minutes)?;
        require_positive("spike_sigma", t.spike_sigma)?;
        require_non_negative("high_ingestion_threshold_gb", t.high_ingestion_threshold_gb)?;
        require_non_negative("query_cost_threshold", t.query_cost_threshold)?;
        require_positive("table_outlier_sigma", t.table_outlier_sigma)?;

        let tiers = &self.tiers;
        if !(tiers.hot_max_age_days < tiers.warm_max_age_days
            && tiers.warm_max_age_days < tiers.cold_max_age_days)
        {
            return Err(AdvisorError::config(format!(
                "age cutoffs must be strictly increasing (hot {} < warm {} < cold {})",
                tiers.hot_max_age_days, tiers.warm_max_age_days, tiers.cold_max_age_days
            )));
        }
        require_non_negative("cold_below_gb", tiers.cold_below_gb)?;
        require_positive("hot_from_gb", tiers.hot_from_gb)?;
        if tiers.cold_below_gb > tiers.hot_from_gb {
            return Err(AdvisorError::config(format!(
                "cold_below_gb ({}) must not exceed hot_from_gb ({})",
                tiers.cold_below_gb, tiers.hot_from_gb
            )));
        }

        for tier in Tier::ALL {
            let rate = self
                .rates
                .rate(tier)
                .map_err(|_| AdvisorError::config(format!("rate table has no entry for '{}'", tier)))?;
            require_non_negative(&format!("rates.{}", tier), rate)?;
        }

        require_positive("billing_period_days", self.billing_period_days)?;
        require_non_negative("ingestion_rate_per_gb", self.ingestion_rate_per_gb)?;
        Ok(())
    }
}

fn require_positive(name: &str, value: f64) -> AdvisorResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AdvisorError::config(format!("{} must be a positive number, got {}", name, value)))
    }
}

fn require_non_negative(name: &str, value: f64) -> AdvisorResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AdvisorError::config(format!("{} must be a non-negative number, got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.deviation_threshold_percent, 50.0);
        assert_eq!(config.thresholds.max_gap_minutes, 10.0);
        assert_eq!(config.tiers.hot_max_age_days, 30);
        assert_eq!(config.tiers.warm_max_age_days, 90);
        assert_eq!(config.tiers.cold_max_age_days, 365);
        assert_eq!(config.rates.rate(Tier::Hot).unwrap(), 2.5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"thresholds": {"max_gap_minutes": 15}, "tiers": {"strategy": "by_age"}}"#,
        )
        .unwrap();
        assert_eq!(config.thresholds.max_gap_minutes, 15.0);
        assert_eq!(config.thresholds.deviation_threshold_percent, 50.0);
        assert_eq!(config.thresholds.table_outlier_sigma, 2.0);
        assert_eq!(config.tiers.strategy, TierStrategy::ByAge);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_tier_in_rate_table_rejected() {
        let result: Result<EngineConfig, _> =
            serde_json::from_str(r#"{"rates": {"hot": 2.5, "glacier": 0.01}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_incomplete_rate_table_rejected() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"rates": {"hot": 2.5, "warm": 0.5, "cold": 0.1}}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AdvisorError::Config { .. }));
        assert!(err.to_string().contains("archive"));
    }

    #[test]
    fn test_negative_rate_rejected() {
        let mut config = EngineConfig::default();
        config.rates = RateTable::new([
            (Tier::Hot, 2.5),
            (Tier::Warm, -0.5),
            (Tier::Cold, 0.1),
            (Tier::Archive, 0.02),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_age_cutoffs_must_increase() {
        let mut config = EngineConfig::default();
        config.tiers.warm_max_age_days = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.deviation_threshold_percent = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.thresholds.max_gap_minutes = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_rate_is_unknown_tier() {
        let rates = RateTable::new([(Tier::Hot, 1.0)]);
        assert!(matches!(
            rates.rate(Tier::Cold),
            Err(AdvisorError::UnknownTier { tier: Tier::Cold })
        ));
    }
}
