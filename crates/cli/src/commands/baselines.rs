//! Baseline commands

use advisor_lib::Baseline;
use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_bytes, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Avg Volume")]
    avg_volume: String,
    #[tabled(rename = "Avg Latency")]
    avg_latency: String,
    #[tabled(rename = "Samples")]
    samples: u64,
    #[tabled(rename = "Last Updated")]
    last_updated: String,
}

impl From<&Baseline> for BaselineRow {
    fn from(b: &Baseline) -> Self {
        Self {
            source: b.source.clone(),
            avg_volume: format_bytes(b.avg_volume),
            avg_latency: format!("{:.3}s", b.avg_latency),
            samples: b.sample_count,
            last_updated: b.last_updated.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// List every baseline, or show one source
pub async fn show_baselines(
    client: &ApiClient,
    source: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let baselines: Vec<Baseline> = match &source {
        Some(source) => match client.baseline(source).await? {
            Some(baseline) => vec![baseline],
            None => {
                print_warning(&format!("No baseline for source '{}'", source));
                return Ok(());
            }
        },
        None => client.baselines().await?.into_values().collect(),
    };

    match format {
        OutputFormat::Json => print_json(&baselines),
        OutputFormat::Table => {
            print_table(
                baselines.iter().map(BaselineRow::from).collect(),
                "No baselines recorded yet",
            );
            Ok(())
        }
    }
}
