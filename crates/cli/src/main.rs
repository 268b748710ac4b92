//! Ingestion Advisor CLI
//!
//! Queries a running advisor for reports and baselines, runs one-shot
//! offline analysis over a metrics batch file, and compares tier costs.

mod client;
mod commands;
mod config;
mod output;

use advisor_lib::{CostModel, Tier, TierStrategy};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{analyze, baselines, report, savings};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Ingestion Advisor CLI
#[derive(Parser)]
#[command(name = "iadv")]
#[command(author, version, about = "CLI for the Ingestion Advisor", long_about = None)]
pub struct Cli {
    /// Advisor API URL (can also be set via IADV_API_URL env var)
    #[arg(long, env = "IADV_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest cycle report from the advisor
    Report {
        /// Only show entries for this source
        #[arg(long, short)]
        source: Option<String>,
    },

    /// Show current baselines from the advisor
    Baselines {
        /// Source to show (all sources if not specified)
        source: Option<String>,
    },

    /// Run one offline cycle over a metrics batch file
    Analyze {
        /// Metrics batch JSON file
        #[arg(long, short)]
        batch: PathBuf,

        /// Baseline state file to load and update (in-memory if not specified)
        #[arg(long)]
        state: Option<PathBuf>,

        /// Engine configuration JSON file
        #[arg(long)]
        engine_config: Option<PathBuf>,

        /// Tier classification strategy (overrides the engine configuration)
        #[arg(long)]
        strategy: Option<StrategyArg>,
    },

    /// Compare the cost of a volume across storage tiers
    Savings {
        /// Volume in GB
        #[arg(long)]
        volume_gb: f64,

        /// Tier the volume is in now (hot, warm, cold, archive)
        #[arg(long)]
        current: Tier,

        /// Tier to compare against
        #[arg(long)]
        recommended: Tier,

        /// Engine configuration JSON file providing the rate table
        #[arg(long)]
        engine_config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    ByVolume,
    ByAge,
}

impl From<StrategyArg> for TierStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::ByVolume => TierStrategy::ByVolume,
            StrategyArg::ByAge => TierStrategy::ByAge,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;

    let api_url = cli
        .api_url
        .or(settings.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    match cli.command {
        Commands::Report { source } => {
            let client = client::ApiClient::new(&api_url)?;
            report::show_report(&client, source, cli.format).await?;
        }
        Commands::Baselines { source } => {
            let client = client::ApiClient::new(&api_url)?;
            baselines::show_baselines(&client, source, cli.format).await?;
        }
        Commands::Analyze {
            batch,
            state,
            engine_config,
            strategy,
        } => {
            let engine_config = engine_config.or(settings.engine_config);
            let config = analyze::load_engine_config(engine_config.as_deref())?;
            analyze::analyze(
                &batch,
                state.as_deref(),
                config,
                strategy.map(TierStrategy::from),
                cli.format,
            )
            .await?;
        }
        Commands::Savings {
            volume_gb,
            current,
            recommended,
            engine_config,
        } => {
            let engine_config = engine_config.or(settings.engine_config);
            let config = analyze::load_engine_config(engine_config.as_deref())?;
            let model = CostModel::new(config.rates);
            savings::show_savings(&model, volume_gb, current, recommended, cli.format)?;
        }
    }

    Ok(())
}
