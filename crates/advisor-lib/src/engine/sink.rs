//! Report sinks

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use super::report::CycleReport;
use crate::error::{AdvisorError, AdvisorResult};

/// Destination for finished cycle reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &CycleReport) -> AdvisorResult<()>;

    fn name(&self) -> &str;
}

/// Keeps the most recent report in memory for the API
#[derive(Debug, Clone, Default)]
pub struct LatestReportSink {
    latest: Arc<RwLock<Option<CycleReport>>>,
}

impl LatestReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest(&self) -> Option<CycleReport> {
        self.latest.read().await.clone()
    }
}

#[async_trait]
impl ReportSink for LatestReportSink {
    async fn publish(&self, report: &CycleReport) -> AdvisorResult<()> {
        *self.latest.write().await = Some(report.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "latest"
    }
}

/// Writes each report as a timestamped JSON file
#[derive(Debug, Clone)]
pub struct JsonDirectorySink {
    dir: PathBuf,
}

impl JsonDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReportSink for JsonDirectorySink {
    async fn publish(&self, report: &CycleReport) -> AdvisorResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(report.file_name());
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(report)?;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            AdvisorError::persistence(format!("failed to write {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), cycle_id = report.cycle_id, "Report written");
        Ok(())
    }

    fn name(&self) -> &str {
        "json_directory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostImpact, CostSummary};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn report(cycle_id: u64) -> CycleReport {
        CycleReport {
            cycle_id,
            cycle_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            duration_ms: 3,
            summaries: vec![],
            anomalies: vec![],
            recommendations: vec![],
            skipped: vec![],
            diagnostics: vec![],
            cost_summary: CostSummary::default(),
            cost_impact: CostImpact::default(),
            total_estimated_savings: 0.0,
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_latest_sink_keeps_newest() {
        let sink = LatestReportSink::new();
        assert!(sink.latest().await.is_none());

        sink.publish(&report(1)).await.unwrap();
        sink.publish(&report(2)).await.unwrap();

        let shared = sink.clone();
        assert_eq!(shared.latest().await.unwrap().cycle_id, 2);
    }

    #[tokio::test]
    async fn test_directory_sink_writes_timestamped_file() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonDirectorySink::new(temp_dir.path().join("reports"));

        sink.publish(&report(7)).await.unwrap();

        let path = temp_dir
            .path()
            .join("reports")
            .join("ingestion_report_20240301_083000_7.json");
        let written: CycleReport =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(written.cycle_id, 7);
    }

    #[tokio::test]
    async fn test_directory_sink_keeps_reports_from_same_second() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonDirectorySink::new(temp_dir.path());

        sink.publish(&report(1)).await.unwrap();
        sink.publish(&report(2)).await.unwrap();

        for cycle_id in [1, 2] {
            let path = temp_dir
                .path()
                .join(format!("ingestion_report_20240301_083000_{}.json", cycle_id));
            let written: CycleReport =
                serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
            assert_eq!(written.cycle_id, cycle_id);
        }
    }
}
