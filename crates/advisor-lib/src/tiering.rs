//! Storage tier classification
//!
//! Maps a source's usage profile to the tier it belongs in. The volume and
//! age strategies are independent; the caller picks one.

use crate::config::TierConfig;
use crate::error::{AdvisorError, AdvisorResult};
use crate::models::{Tier, TierAssignment, TierBasis, TierStrategy, UsageProfile};

/// Classify a source and pair the verdict with its current tier
pub fn classify(
    source: &str,
    profile: &UsageProfile,
    strategy: TierStrategy,
    current_tier: Tier,
    config: &TierConfig,
) -> AdvisorResult<TierAssignment> {
    let (recommended_tier, basis, metric_value) = match strategy {
        TierStrategy::ByVolume => (
            tier_for_volume(profile.daily_avg_gb, config),
            TierBasis::Volume,
            profile.daily_avg_gb,
        ),
        TierStrategy::ByAge => {
            let age = profile.age_days.ok_or_else(|| AdvisorError::MissingProfile {
                source_id: source.to_string(),
                field: "data_age_days",
            })?;
            (tier_for_age(age, config), TierBasis::Age, f64::from(age))
        }
    };

    Ok(TierAssignment {
        source: source.to_string(),
        current_tier,
        recommended_tier,
        basis,
        metric_value,
    })
}

/// Lower bounds are inclusive: exactly `hot_from_gb` is hot
pub fn tier_for_volume(daily_avg_gb: f64, config: &TierConfig) -> Tier {
    if daily_avg_gb >= config.hot_from_gb {
        Tier::Hot
    } else if daily_avg_gb >= config.cold_below_gb {
        Tier::Warm
    } else {
        Tier::Cold
    }
}

pub fn tier_for_age(age_days: u32, config: &TierConfig) -> Tier {
    if age_days <= config.hot_max_age_days {
        Tier::Hot
    } else if age_days <= config.warm_max_age_days {
        Tier::Warm
    } else if age_days <= config.cold_max_age_days {
        Tier::Cold
    } else {
        Tier::Archive
    }
}
