//! Cycle report types

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::{CostImpact, CostSummary};
use crate::models::{Anomaly, Baseline, CostEstimate, Recommendation, TierAssignment};

/// Per-source figures computed during a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: String,
    pub sample_count: usize,
    pub total_volume_gb: f64,
    /// Total volume over the number of distinct UTC days in the window
    pub daily_avg_gb: f64,
    pub avg_latency_seconds: f64,
    #[serde(default)]
    pub total_records: u64,
    /// `None` when the source had no baseline before this cycle
    pub volume_deviation_percent: Option<f64>,
    pub latency_deviation_percent: Option<f64>,
    /// Baseline after this cycle's samples were folded in
    pub baseline: Baseline,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<TierAssignment>,
    /// Monthly projection in the current tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<CostEstimate>,
    /// UTC hours with the highest mean volume, busiest first
    #[serde(default)]
    pub peak_hours: Vec<u32>,
    #[serde(default)]
    pub daily_volumes_gb: BTreeMap<NaiveDate, f64>,
}

/// A source that was not analyzed this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Provider,
    Persistence,
    SoftTimeout,
    Stopped,
    Task,
    /// Sample entries that named no source
    Input,
    /// Tier or cost step failed; the source was still analyzed
    Tiering,
}

/// Cycle-level problem that did not abort the cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Everything one cycle produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub cycle_timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub summaries: Vec<SourceSummary>,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<Recommendation>,
    pub skipped: Vec<SkippedSource>,
    pub diagnostics: Vec<Diagnostic>,
    pub cost_summary: CostSummary,
    #[serde(default)]
    pub cost_impact: CostImpact,
    pub total_estimated_savings: f64,
    /// Provider or persistence fell back this cycle
    pub degraded: bool,
}

impl CycleReport {
    pub fn summary(&self, source: &str) -> Option<&SourceSummary> {
        self.summaries.iter().find(|s| s.source == source)
    }

    pub fn anomalies_for<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Anomaly> + 'a {
        self.anomalies.iter().filter(move |a| a.source == source)
    }

    pub fn recommendations_for<'a>(
        &'a self,
        source: &'a str,
    ) -> impl Iterator<Item = &'a Recommendation> + 'a {
        self.recommendations.iter().filter(move |r| r.target == source)
    }

    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    /// File name used when a report is written to disk
    pub fn file_name(&self) -> String {
        format!(
            "ingestion_report_{}_{}.json",
            self.cycle_timestamp.format("%Y%m%d_%H%M%S"),
            self.cycle_id
        )
    }
}
