//! Daemon configuration
//!
//! Read from an optional file (`ADVISOR_CONFIG`, default `advisor.toml`)
//! with `ADVISOR__*` environment variables layered on top. Nested keys use
//! `__`, e.g. `ADVISOR__ENGINE__THRESHOLDS__MAX_GAP_MINUTES=15`.

use advisor_lib::{CycleSettings, EngineConfig};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorSettings {
    /// Name attached to every structured log event
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health/metrics/report endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Baseline state file
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Metrics batch file read each cycle
    #[serde(default = "default_batch_path")]
    pub batch_path: PathBuf,

    /// Directory for per-cycle JSON reports; unset disables file output
    #[serde(default)]
    pub report_dir: Option<PathBuf>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub cycle: CycleSettings,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "ingestion-advisor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_cycle_interval() -> u64 {
    300
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state/baselines.json")
}

fn default_batch_path() -> PathBuf {
    PathBuf::from("metrics/batch.json")
}

impl AdvisorSettings {
    /// Load from the file named by `ADVISOR_CONFIG` and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("ADVISOR_CONFIG").unwrap_or_else(|_| "advisor.toml".to_string());
        Self::load_from(&path)
    }

    /// Load from a specific file (which may be absent) and the environment
    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("ADVISOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path))?;

        let settings: AdvisorSettings = config
            .try_deserialize()
            .context("invalid advisor configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Refuse to start with a configuration the engine cannot run
    pub fn validate(&self) -> Result<()> {
        self.engine.validate().context("invalid engine configuration")?;
        self.cycle.validate().context("invalid cycle settings")?;
        if self.cycle_interval_secs == 0 {
            bail!("cycle_interval_secs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_lib::{Tier, TierStrategy};
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("advisor.toml");
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let settings = AdvisorSettings::load_from(&path.to_string_lossy()).unwrap();

        assert_eq!(settings.cycle_interval_secs, 300);
        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.cycle.concurrency_limit, 8);
        assert!(settings.report_dir.is_none());
    }

    #[test]
    fn test_file_values() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
cycle_interval_secs = 60
report_dir = "reports"

[engine.thresholds]
max_gap_minutes = 15.0

[engine.tiers]
strategy = "by_age"

[engine.rates]
hot = 3.0
warm = 0.5
cold = 0.1
archive = 0.02

[cycle]
concurrency_limit = 2
cycle_budget = 30000
"#,
        );

        let settings = AdvisorSettings::load_from(&path).unwrap();
        assert_eq!(settings.cycle_interval_secs, 60);
        assert_eq!(settings.report_dir, Some(PathBuf::from("reports")));
        assert_eq!(settings.engine.thresholds.max_gap_minutes, 15.0);
        assert_eq!(settings.engine.thresholds.deviation_threshold_percent, 50.0);
        assert_eq!(settings.engine.tiers.strategy, TierStrategy::ByAge);
        assert_eq!(settings.engine.rates.rate(Tier::Hot).unwrap(), 3.0);
        assert_eq!(settings.cycle.concurrency_limit, 2);
        assert_eq!(settings.cycle.cycle_budget, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_thresholds_fail_fast() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[engine.tiers]
hot_max_age_days = 120
warm_max_age_days = 90
"#,
        );

        let err = AdvisorSettings::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("strictly increasing"));
    }

    #[test]
    fn test_incomplete_rate_table_fails_fast() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[engine.rates]\nhot = 2.5\n");
        assert!(AdvisorSettings::load_from(&path).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "instance = \"from-file\"\n");

        std::env::set_var("ADVISOR__INSTANCE", "from-env");
        let settings = AdvisorSettings::load_from(&path);
        std::env::remove_var("ADVISOR__INSTANCE");

        assert_eq!(settings.unwrap().instance, "from-env");
    }
}
