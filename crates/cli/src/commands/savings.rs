//! Tier cost comparison using the advisor's cost model

use advisor_lib::{CostEstimate, CostModel, Tier};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_savings, color_tier, format_currency, format_gb, print_json, OutputFormat};

#[derive(Tabled)]
struct TierCostRow {
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Rate/GB")]
    rate: String,
    #[tabled(rename = "Cost")]
    cost: String,
}

/// Cost of a volume in every tier plus the savings of one move
#[derive(Debug, Serialize)]
pub struct SavingsEstimate {
    pub volume_gb: f64,
    pub current: CostEstimate,
    pub recommended: CostEstimate,
    pub savings: f64,
    pub all_tiers: Vec<CostEstimate>,
}

pub fn estimate(
    model: &CostModel,
    volume_gb: f64,
    current: Tier,
    recommended: Tier,
) -> Result<SavingsEstimate> {
    anyhow::ensure!(
        volume_gb.is_finite() && volume_gb >= 0.0,
        "volume must be a non-negative number of GB"
    );
    Ok(SavingsEstimate {
        volume_gb,
        current: model.estimate_cost(volume_gb, current)?,
        recommended: model.estimate_cost(volume_gb, recommended)?,
        savings: model.calculate_savings(volume_gb, current, recommended)?,
        all_tiers: Tier::ALL
            .iter()
            .map(|tier| model.estimate_cost(volume_gb, *tier))
            .collect::<Result<_, _>>()?,
    })
}

/// Show what moving `volume_gb` from `current` to `recommended` saves
pub fn show_savings(
    model: &CostModel,
    volume_gb: f64,
    current: Tier,
    recommended: Tier,
    format: OutputFormat,
) -> Result<()> {
    let result = estimate(model, volume_gb, current, recommended)?;

    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table => {
            let rows: Vec<TierCostRow> = result
                .all_tiers
                .iter()
                .map(|e| TierCostRow {
                    tier: color_tier(e.tier),
                    rate: format_currency(e.rate_per_gb),
                    cost: format_currency(e.total_cost),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();

            println!("{}", "Tier Costs".bold());
            println!("{}", "=".repeat(50));
            println!("Volume:                 {}", format_gb(result.volume_gb));
            println!("{}", table);
            println!();
            println!(
                "{} -> {}:  {}",
                color_tier(current),
                color_tier(recommended),
                color_savings(result.savings).bold()
            );
            if result.savings <= 0.0 {
                println!("{}", "Moving would not reduce cost".dimmed());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_lib::RateTable;

    #[test]
    fn test_hot_to_cold_savings() {
        let model = CostModel::new(RateTable::default());
        let result = estimate(&model, 100.0, Tier::Hot, Tier::Cold).unwrap();

        assert!((result.savings - 240.0).abs() < 1e-9);
        assert_eq!(result.current.total_cost, 250.0);
        assert_eq!(result.all_tiers.len(), 4);
    }

    #[test]
    fn test_moving_up_is_negative() {
        let model = CostModel::new(RateTable::default());
        let result = estimate(&model, 10.0, Tier::Cold, Tier::Hot).unwrap();
        assert!(result.savings < 0.0);
    }

    #[test]
    fn test_missing_rate_is_error() {
        let model = CostModel::new(RateTable::new([(Tier::Hot, 2.5)]));
        assert!(estimate(&model, 10.0, Tier::Hot, Tier::Cold).is_err());
    }

    #[test]
    fn test_negative_volume_rejected() {
        let model = CostModel::new(RateTable::default());
        assert!(estimate(&model, -1.0, Tier::Hot, Tier::Cold).is_err());
    }
}
