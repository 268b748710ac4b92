//! Core data models for the ingestion advisor

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, AdvisorResult};

/// Bytes per gigabyte (binary, matching how the platform bills ingestion)
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Convert a byte count to gigabytes
pub fn bytes_to_gb(bytes: f64) -> f64 {
    bytes / BYTES_PER_GB
}

/// One time-bucketed measurement for a log source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSample {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub volume_bytes: u64,
    pub latency_seconds: f64,
    pub record_count: u64,
}

impl MeasurementSample {
    /// Create a validated sample
    pub fn new(
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
        volume_bytes: u64,
        latency_seconds: f64,
        record_count: u64,
    ) -> AdvisorResult<Self> {
        let sample = Self {
            source: source.into(),
            timestamp,
            volume_bytes,
            latency_seconds,
            record_count,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Check a sample that arrived through deserialization
    pub fn validate(&self) -> AdvisorResult<()> {
        if self.source.trim().is_empty() {
            return Err(AdvisorError::invalid_sample(
                &self.source,
                "source identifier is empty",
            ));
        }
        if !self.latency_seconds.is_finite() {
            return Err(AdvisorError::invalid_sample(
                &self.source,
                format!("latency is not finite ({})", self.latency_seconds),
            ));
        }
        if self.latency_seconds < 0.0 {
            return Err(AdvisorError::invalid_sample(
                &self.source,
                format!("latency is negative ({})", self.latency_seconds),
            ));
        }
        Ok(())
    }

    pub fn volume_gb(&self) -> f64 {
        bytes_to_gb(self.volume_bytes as f64)
    }
}

/// Rolling per-source statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub source: String,
    /// Mean volume in bytes over every sample folded in
    pub avg_volume: f64,
    /// Mean latency in seconds over every sample folded in
    pub avg_latency: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Kind of anomaly raised by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    VolumeDeviation,
    LatencyDeviation,
    VolumeSpike,
    DataGap,
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyType::VolumeDeviation => write!(f, "VolumeDeviation"),
            AnomalyType::LatencyDeviation => write!(f, "LatencyDeviation"),
            AnomalyType::VolumeSpike => write!(f, "VolumeSpike"),
            AnomalyType::DataGap => write!(f, "DataGap"),
        }
    }
}

/// Anomaly severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// A deviation, spike or gap found in one source's batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub source: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Storage tier, ordered from most to least expensive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
    Archive,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Hot, Tier::Warm, Tier::Cold, Tier::Archive];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Hot => write!(f, "hot"),
            Tier::Warm => write!(f, "warm"),
            Tier::Cold => write!(f, "cold"),
            Tier::Archive => write!(f, "archive"),
        }
    }
}

impl FromStr for Tier {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cold" => Ok(Tier::Cold),
            "archive" => Ok(Tier::Archive),
            other => Err(AdvisorError::config(format!("unknown tier '{}'", other))),
        }
    }
}

/// Tier classification policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStrategy {
    #[default]
    ByVolume,
    ByAge,
}

/// Which metric a tier verdict was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierBasis {
    Volume,
    Age,
}

/// Inputs the classifier looks at for one source
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageProfile {
    pub daily_avg_gb: f64,
    pub age_days: Option<u32>,
}

/// Current versus recommended tier for a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAssignment {
    pub source: String,
    pub current_tier: Tier,
    pub recommended_tier: Tier,
    pub basis: TierBasis,
    pub metric_value: f64,
}

impl TierAssignment {
    pub fn needs_change(&self) -> bool {
        self.current_tier != self.recommended_tier
    }
}

/// Cost of holding a volume in a tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub tier: Tier,
    pub rate_per_gb: f64,
    pub volume_gb: f64,
    pub total_cost: f64,
}

/// Recommendation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    HighIngestion,
    StorageTierOptimization,
    QueryOptimization,
    DataGapRemediation,
    /// Source ingests far above the other sources in the cycle
    TableOptimization,
}

impl RecommendationType {
    /// Fixed impact per recommendation type
    pub fn impact(&self) -> Impact {
        match self {
            RecommendationType::HighIngestion => Impact::High,
            RecommendationType::StorageTierOptimization => Impact::Medium,
            RecommendationType::QueryOptimization => Impact::Medium,
            RecommendationType::DataGapRemediation => Impact::High,
            RecommendationType::TableOptimization => Impact::Medium,
        }
    }
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationType::HighIngestion => write!(f, "HighIngestion"),
            RecommendationType::StorageTierOptimization => write!(f, "StorageTierOptimization"),
            RecommendationType::QueryOptimization => write!(f, "QueryOptimization"),
            RecommendationType::DataGapRemediation => write!(f, "DataGapRemediation"),
            RecommendationType::TableOptimization => write!(f, "TableOptimization"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::High => write!(f, "high"),
            Impact::Medium => write!(f, "medium"),
            Impact::Low => write!(f, "low"),
        }
    }
}

/// Recommendations are proposals only; acting on them happens elsewhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    #[default]
    Pending,
}

/// What a recommendation compared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum Observation {
    Threshold { current_value: f64, threshold: f64 },
    Tier { current_tier: Tier, recommended_tier: Tier },
}

/// A proposed, non-binding optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation_type: RecommendationType,
    pub target: String,
    pub observation: Observation,
    pub impact: Impact,
    pub estimated_savings: f64,
    pub suggestion: String,
    pub status: RecommendationStatus,
}

impl Recommendation {
    /// Build a pending recommendation; impact follows the type and savings never go below zero
    pub fn new(
        recommendation_type: RecommendationType,
        target: impl Into<String>,
        observation: Observation,
        estimated_savings: f64,
        suggestion: impl Into<String>,
    ) -> Self {
        let estimated_savings = if estimated_savings.is_finite() {
            estimated_savings.max(0.0)
        } else {
            0.0
        };
        Self {
            recommendation_type,
            target: target.into(),
            observation,
            impact: recommendation_type.impact(),
            estimated_savings,
            suggestion: suggestion.into(),
            status: RecommendationStatus::Pending,
        }
    }
}

/// Inventory entry the provider reports alongside samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    pub source: String,
    pub current_tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_age_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_query_cost: Option<f64>,
}

/// A sample entry that could not be decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSample {
    /// Source named by the entry, when it carried a readable one
    pub source: Option<String>,
    pub reason: String,
}

/// Everything the metrics provider hands over for one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsBatch {
    #[serde(default)]
    pub samples: Vec<MeasurementSample>,
    #[serde(default)]
    pub sources: Vec<SourceState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedSample>,
}

#[derive(Deserialize)]
struct RawBatch {
    #[serde(default)]
    samples: Vec<serde_json::Value>,
    #[serde(default)]
    sources: Vec<SourceState>,
}

impl MetricsBatch {
    pub fn new(samples: Vec<MeasurementSample>, sources: Vec<SourceState>) -> Self {
        Self {
            samples,
            sources,
            rejected: Vec::new(),
        }
    }

    /// Decode a batch one sample at a time.
    ///
    /// A sample that does not decode (negative volume, missing field, bad
    /// timestamp) lands in `rejected` instead of failing the whole batch.
    /// Only a document that is not a batch at all is an error.
    pub fn from_json(bytes: &[u8]) -> AdvisorResult<Self> {
        let raw: RawBatch = serde_json::from_slice(bytes)?;
        let mut batch = Self::new(Vec::with_capacity(raw.samples.len()), raw.sources);

        for value in raw.samples {
            let source = value
                .get("source")
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string);
            match serde_json::from_value::<MeasurementSample>(value) {
                Ok(sample) => batch.samples.push(sample),
                Err(e) => batch.rejected.push(RejectedSample {
                    source,
                    reason: format!("malformed sample: {}", e),
                }),
            }
        }

        Ok(batch)
    }
}
