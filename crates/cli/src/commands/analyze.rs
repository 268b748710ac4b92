//! Offline one-shot analysis of a metrics batch file

use advisor_lib::{
    BaselinePersistence, EngineConfig, JsonFileStore, MemoryPersistence, MetricsBatch,
    RecommendationEngine, StaticProvider, StopSignal, TierStrategy,
};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use super::report::render_report;
use crate::output::{print_success, OutputFormat};

/// Read an engine configuration file, or use the defaults
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read engine config {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse engine config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    Ok(config)
}

/// Run a single cycle over `batch_path`.
///
/// With `state_path` the baselines are loaded from and saved back to that
/// file, so repeated runs build history the way the daemon does.
pub async fn analyze(
    batch_path: &Path,
    state_path: Option<&Path>,
    mut config: EngineConfig,
    strategy: Option<TierStrategy>,
    format: OutputFormat,
) -> Result<()> {
    let content = std::fs::read(batch_path)
        .with_context(|| format!("Failed to read batch file {}", batch_path.display()))?;
    let batch = MetricsBatch::from_json(&content)
        .with_context(|| format!("Failed to parse batch file {}", batch_path.display()))?;

    if let Some(strategy) = strategy {
        config.tiers.strategy = strategy;
    }

    let persistence: Arc<dyn BaselinePersistence> = match state_path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryPersistence::default()),
    };

    let engine = RecommendationEngine::builder()
        .provider(Arc::new(StaticProvider::new([batch])))
        .persistence(persistence)
        .config(config)
        .instance("iadv")
        .build()
        .await
        .context("Failed to initialize recommendation engine")?;

    let report = engine.run_cycle(&StopSignal::new()).await;
    render_report(&report, format)?;

    if let (Some(path), OutputFormat::Table) = (state_path, format) {
        if !report.degraded {
            print_success(&format!("Baselines saved to {}", path.display()));
        }
    }

    Ok(())
}
