//! Per-source analysis
//!
//! Turns one source's validated window into a summary, anomalies and
//! recommendations. A failing tier or cost step is reported as a diagnostic
//! and the source is still analyzed and folded into its baseline.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use super::patterns::{daily_volumes_gb, peak_hours, PEAK_HOUR_COUNT};
use super::report::{Diagnostic, DiagnosticKind, SkippedSource, SourceSummary};
use crate::anomaly::{deviation_percent, AnomalyDetector};
use crate::baseline::BaselineStore;
use crate::config::EngineConfig;
use crate::cost::CostModel;
use crate::error::{AdvisorError, AdvisorResult};
use crate::models::{
    bytes_to_gb, Anomaly, AnomalyType, CostEstimate, MeasurementSample, MetricsBatch,
    Observation, Recommendation, RecommendationType, SourceState, TierAssignment, UsageProfile,
};
use crate::tiering;

/// One source's share of a batch
#[derive(Debug, Clone)]
pub struct SourceWork {
    pub source: String,
    /// Deduplicated and sorted by timestamp
    pub samples: Vec<MeasurementSample>,
    pub state: Option<SourceState>,
}

/// Split a batch into per-source work, ordered by source
///
/// Samples are deduplicated on timestamp within a source, keeping the last
/// one seen. A source with any invalid or undecodable sample is skipped as
/// a whole. Undecodable entries that name no source become `Input`
/// diagnostics. Inventory entries without samples produce no work.
pub fn group_batch(
    batch: MetricsBatch,
) -> (Vec<SourceWork>, Vec<SkippedSource>, Vec<Diagnostic>) {
    let mut grouped: BTreeMap<String, BTreeMap<DateTime<Utc>, MeasurementSample>> =
        BTreeMap::new();
    let mut invalid: BTreeMap<String, String> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for rejected in batch.rejected {
        match rejected.source {
            Some(source) => {
                invalid.entry(source).or_insert(rejected.reason);
            }
            None => diagnostics.push(Diagnostic::new(
                DiagnosticKind::Input,
                format!("dropped sample without a source: {}", rejected.reason),
            )),
        }
    }

    for sample in batch.samples {
        if let Err(e) = sample.validate() {
            invalid.entry(sample.source.clone()).or_insert_with(|| e.to_string());
            continue;
        }
        grouped
            .entry(sample.source.clone())
            .or_default()
            .insert(sample.timestamp, sample);
    }

    let mut states: BTreeMap<String, SourceState> = batch
        .sources
        .into_iter()
        .map(|state| (state.source.clone(), state))
        .collect();

    let skipped = invalid
        .into_iter()
        .map(|(source, reason)| {
            grouped.remove(&source);
            SkippedSource { source, reason }
        })
        .collect();

    let work = grouped
        .into_iter()
        .map(|(source, samples)| SourceWork {
            state: states.remove(&source),
            samples: samples.into_values().collect(),
            source,
        })
        .collect();

    (work, skipped, diagnostics)
}

/// Result of analyzing one source
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub summary: SourceSummary,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<Recommendation>,
    /// Projected storage cost in the current tier, zero without inventory
    pub storage_cost: f64,
    pub query_cost: f64,
    /// Steps that failed without stopping the analysis
    pub diagnostics: Vec<Diagnostic>,
}

/// Tier and cost figures for a source with inventory
struct TierOutcome {
    assignment: TierAssignment,
    estimate: CostEstimate,
    recommendation: Option<Recommendation>,
}

/// Stateless analysis shared by every task in a cycle
pub struct SourceProcessor {
    config: Arc<EngineConfig>,
    detector: AnomalyDetector,
    cost: CostModel,
}

impl SourceProcessor {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            detector: AnomalyDetector::new(&config.thresholds),
            cost: CostModel::new(config.rates.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Analyze a source, then fold its samples into the store
    pub fn process(&self, work: SourceWork, store: &BaselineStore) -> AdvisorResult<SourceOutcome> {
        let SourceWork {
            source,
            samples,
            state,
        } = work;

        let volumes = VolumeStats::from_samples(&samples);
        let thresholds = &self.config.thresholds;
        let period = self.config.billing_period_days;
        let mut recommendations = Vec::new();
        let mut diagnostics = Vec::new();
        let mut tier = None;
        let mut cost_estimate = None;

        if let Some(state) = &state {
            match self.classify_and_cost(&source, state, &volumes) {
                Ok(outcome) => {
                    recommendations.extend(outcome.recommendation);
                    tier = Some(outcome.assignment);
                    cost_estimate = Some(outcome.estimate);
                }
                Err(e) => {
                    debug!(source_id = %source, error = %e, "Tier step failed");
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::Tiering,
                        format!("{}: {}", source, e),
                    ));
                }
            }
        }
        let storage_cost = cost_estimate.as_ref().map_or(0.0, |e| e.total_cost);

        if volumes.daily_avg_gb > thresholds.high_ingestion_threshold_gb {
            let excess_gb = volumes.daily_avg_gb - thresholds.high_ingestion_threshold_gb;
            let rate = state
                .as_ref()
                .and_then(|s| self.cost.rates().rate(s.current_tier).ok())
                .unwrap_or(0.0);
            let savings = excess_gb * period * rate;
            recommendations.push(Recommendation::new(
                RecommendationType::HighIngestion,
                &source,
                Observation::Threshold {
                    current_value: volumes.daily_avg_gb,
                    threshold: thresholds.high_ingestion_threshold_gb,
                },
                savings,
                "Review data collection rules and filter unnecessary events",
            ));
        }

        let query_cost = state.as_ref().and_then(|s| s.avg_query_cost).unwrap_or(0.0);
        if query_cost > thresholds.query_cost_threshold {
            recommendations.push(Recommendation::new(
                RecommendationType::QueryOptimization,
                &source,
                Observation::Threshold {
                    current_value: query_cost,
                    threshold: thresholds.query_cost_threshold,
                },
                query_cost - thresholds.query_cost_threshold,
                "Optimize query patterns and implement result caching",
            ));
        }

        let prior = store.get(&source);
        let anomalies = self.detector.detect(&source, &samples, prior.as_ref());

        let longest_gap = anomalies
            .iter()
            .filter(|a| a.anomaly_type == AnomalyType::DataGap)
            .filter_map(|a| a.details.get("gap_minutes").and_then(|v| v.as_f64()))
            .fold(None, |max: Option<f64>, gap| Some(max.map_or(gap, |m| m.max(gap))));
        if let Some(gap_minutes) = longest_gap {
            recommendations.push(Recommendation::new(
                RecommendationType::DataGapRemediation,
                &source,
                Observation::Threshold {
                    current_value: gap_minutes,
                    threshold: thresholds.max_gap_minutes,
                },
                0.0,
                "Check the collection pipeline for dropped or delayed data",
            ));
        }

        let (volume_deviation_percent, latency_deviation_percent) = match &prior {
            Some(b) => (
                Some(deviation_percent(volumes.mean_volume_bytes, b.avg_volume)),
                Some(deviation_percent(volumes.mean_latency_seconds, b.avg_latency)),
            ),
            None => (None, None),
        };

        let baseline = samples
            .iter()
            .map(|sample| store.update(&source, sample))
            .last()
            .ok_or_else(|| AdvisorError::invalid_sample(&source, "no samples in window"))?;

        Ok(SourceOutcome {
            summary: SourceSummary {
                source,
                sample_count: samples.len(),
                total_volume_gb: volumes.total_gb,
                daily_avg_gb: volumes.daily_avg_gb,
                avg_latency_seconds: volumes.mean_latency_seconds,
                total_records: volumes.total_records,
                volume_deviation_percent,
                latency_deviation_percent,
                baseline,
                tier,
                cost_estimate,
                peak_hours: peak_hours(&samples, PEAK_HOUR_COUNT),
                daily_volumes_gb: daily_volumes_gb(&samples),
            },
            anomalies,
            recommendations,
            storage_cost,
            query_cost,
            diagnostics,
        })
    }

    /// Classify the source and price its monthly volume in the current tier
    fn classify_and_cost(
        &self,
        source: &str,
        state: &SourceState,
        volumes: &VolumeStats,
    ) -> AdvisorResult<TierOutcome> {
        let profile = UsageProfile {
            daily_avg_gb: volumes.daily_avg_gb,
            age_days: state.data_age_days,
        };
        let assignment = tiering::classify(
            source,
            &profile,
            self.config.tiers.strategy,
            state.current_tier,
            &self.config.tiers,
        )?;

        let monthly_gb = volumes.daily_avg_gb * self.config.billing_period_days;
        let estimate = self.cost.estimate_cost(monthly_gb, state.current_tier)?;

        let mut recommendation = None;
        if assignment.needs_change() {
            let savings = self.cost.calculate_savings(
                monthly_gb,
                assignment.current_tier,
                assignment.recommended_tier,
            )?;
            if savings > 0.0 {
                recommendation = Some(Recommendation::new(
                    RecommendationType::StorageTierOptimization,
                    source,
                    Observation::Tier {
                        current_tier: assignment.current_tier,
                        recommended_tier: assignment.recommended_tier,
                    },
                    savings,
                    format!(
                        "Move {} from {} to {} storage",
                        source, assignment.current_tier, assignment.recommended_tier
                    ),
                ));
            }
        }

        Ok(TierOutcome {
            assignment,
            estimate,
            recommendation,
        })
    }
}

/// Aggregate volume figures of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeStats {
    pub total_gb: f64,
    pub daily_avg_gb: f64,
    pub mean_volume_bytes: f64,
    pub mean_latency_seconds: f64,
    pub total_records: u64,
}

impl VolumeStats {
    pub fn from_samples(samples: &[MeasurementSample]) -> Self {
        if samples.is_empty() {
            return Self {
                total_gb: 0.0,
                daily_avg_gb: 0.0,
                mean_volume_bytes: 0.0,
                mean_latency_seconds: 0.0,
                total_records: 0,
            };
        }

        let n = samples.len() as f64;
        let total_bytes: f64 = samples.iter().map(|s| s.volume_bytes as f64).sum();
        let days: BTreeSet<NaiveDate> = samples.iter().map(|s| s.timestamp.date_naive()).collect();
        let total_gb = bytes_to_gb(total_bytes);

        Self {
            total_gb,
            daily_avg_gb: total_gb / days.len() as f64,
            mean_volume_bytes: total_bytes / n,
            mean_latency_seconds: samples.iter().map(|s| s.latency_seconds).sum::<f64>() / n,
            total_records: samples.iter().map(|s| s.record_count).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryPersistence;
    use crate::models::{RejectedSample, Tier, TierStrategy, BYTES_PER_GB};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn gb(n: f64) -> u64 {
        (n * BYTES_PER_GB) as u64
    }

    fn sample(source: &str, minute: i64, volume: u64) -> MeasurementSample {
        MeasurementSample {
            source: source.to_string(),
            timestamp: start() + Duration::minutes(minute),
            volume_bytes: volume,
            latency_seconds: 1.0,
            record_count: 1,
        }
    }

    fn state(source: &str, tier: Tier) -> SourceState {
        SourceState {
            source: source.to_string(),
            current_tier: tier,
            data_age_days: None,
            avg_query_cost: None,
        }
    }

    fn store() -> BaselineStore {
        BaselineStore::new(Arc::new(MemoryPersistence::default()))
    }

    fn processor(config: EngineConfig) -> SourceProcessor {
        SourceProcessor::new(Arc::new(config))
    }

    fn work(samples: Vec<MeasurementSample>, state: Option<SourceState>) -> SourceWork {
        SourceWork {
            source: samples[0].source.clone(),
            samples,
            state,
        }
    }

    #[test]
    fn test_group_batch_dedupes_last_write_wins() {
        let batch = MetricsBatch {
            samples: vec![
                sample("B", 5, 1),
                sample("A", 5, 10),
                sample("A", 0, 20),
                sample("A", 5, 30),
            ],
            sources: vec![state("A", Tier::Hot), state("Idle", Tier::Cold)],
            ..Default::default()
        };

        let (work, skipped, diagnostics) = group_batch(batch);
        assert!(skipped.is_empty());
        assert!(diagnostics.is_empty());
        assert_eq!(work.len(), 2);
        assert_eq!(work[0].source, "A");
        assert_eq!(
            work[0].samples.iter().map(|s| s.volume_bytes).collect::<Vec<_>>(),
            vec![20, 30]
        );
        assert!(work[0].state.is_some());
        assert_eq!(work[1].source, "B");
        assert!(work[1].state.is_none());
    }

    #[test]
    fn test_group_batch_skips_source_with_invalid_sample() {
        let mut bad = sample("A", 10, 1);
        bad.latency_seconds = f64::NAN;
        let batch = MetricsBatch {
            samples: vec![sample("A", 0, 1), bad, sample("B", 0, 1)],
            sources: vec![],
            ..Default::default()
        };

        let (work, skipped, _) = group_batch(batch);
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].source, "B");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].source, "A");
        assert!(skipped[0].reason.contains("latency"));
    }

    #[test]
    fn test_group_batch_skips_source_with_undecodable_sample() {
        let mut batch =
            MetricsBatch::new(vec![sample("Bad", 0, 1), sample("Good", 0, 100)], vec![]);
        batch.rejected = vec![
            RejectedSample {
                source: Some("Bad".to_string()),
                reason: "malformed sample: invalid value: integer `-5`".to_string(),
            },
            RejectedSample {
                source: None,
                reason: "malformed sample: missing field `source`".to_string(),
            },
        ];

        let (work, skipped, diagnostics) = group_batch(batch);
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].source, "Good");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].source, "Bad");
        assert!(skipped[0].reason.contains("-5"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Input);
    }

    #[test]
    fn test_daily_average_uses_distinct_days() {
        let samples = vec![
            sample("A", 0, gb(2.0)),
            sample("A", 60, gb(2.0)),
            sample("A", 24 * 60, gb(2.0)),
        ];
        let stats = VolumeStats::from_samples(&samples);
        assert!((stats.total_gb - 6.0).abs() < 1e-9);
        assert!((stats.daily_avg_gb - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tier_recommendation_with_monthly_savings() {
        // 0.5 GB/day in hot storage belongs in cold: 15 GB * (2.5 - 0.1) = 36
        let processor = processor(EngineConfig::default());
        let outcome = processor
            .process(
                work(vec![sample("S", 0, gb(0.5))], Some(state("S", Tier::Hot))),
                &store(),
            )
            .unwrap();

        assert_eq!(outcome.recommendations.len(), 1);
        let rec = &outcome.recommendations[0];
        assert_eq!(rec.recommendation_type, RecommendationType::StorageTierOptimization);
        assert!((rec.estimated_savings - 36.0).abs() < 1e-9);
        assert!((outcome.storage_cost - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_more_expensive_tier_is_not_recommended() {
        let processor = processor(EngineConfig::default());
        let outcome = processor
            .process(
                work(vec![sample("S", 0, gb(50.0))], Some(state("S", Tier::Warm))),
                &store(),
            )
            .unwrap();

        let tier = outcome.summary.tier.unwrap();
        assert_eq!(tier.recommended_tier, Tier::Hot);
        assert!(outcome.recommendations.is_empty());
    }

    #[test]
    fn test_high_ingestion_and_query_cost() {
        let processor = processor(EngineConfig::default());
        let mut inventory = state("S", Tier::Hot);
        inventory.avg_query_cost = Some(80.0);

        let outcome = processor
            .process(work(vec![sample("S", 0, gb(120.0))], Some(inventory)), &store())
            .unwrap();

        let kinds: Vec<_> = outcome
            .recommendations
            .iter()
            .map(|r| r.recommendation_type)
            .collect();
        assert_eq!(
            kinds,
            vec![RecommendationType::HighIngestion, RecommendationType::QueryOptimization]
        );
        // 20 GB excess * 30 days * 2.5
        assert!((outcome.recommendations[0].estimated_savings - 1500.0).abs() < 1e-6);
        assert_eq!(outcome.recommendations[1].estimated_savings, 30.0);
        assert_eq!(outcome.query_cost, 80.0);
    }

    #[test]
    fn test_high_ingestion_without_inventory_has_zero_savings() {
        let processor = processor(EngineConfig::default());
        let outcome = processor
            .process(work(vec![sample("S", 0, gb(150.0))], None), &store())
            .unwrap();

        assert_eq!(outcome.recommendations.len(), 1);
        assert_eq!(outcome.recommendations[0].estimated_savings, 0.0);
        assert!(outcome.summary.tier.is_none());
    }

    #[test]
    fn test_data_gap_remediation() {
        let processor = processor(EngineConfig::default());
        let samples = vec![sample("S", 0, 10), sample("S", 5, 10), sample("S", 45, 10)];
        let outcome = processor.process(work(samples, None), &store()).unwrap();

        assert_eq!(outcome.anomalies.len(), 1);
        let rec = &outcome.recommendations[0];
        assert_eq!(rec.recommendation_type, RecommendationType::DataGapRemediation);
        assert_eq!(
            rec.observation,
            Observation::Threshold {
                current_value: 40.0,
                threshold: 10.0
            }
        );
    }

    #[test]
    fn test_tiering_failure_still_analyzes_source() {
        let mut config = EngineConfig::default();
        config.tiers.strategy = TierStrategy::ByAge;
        let processor = processor(config);
        let store = store();
        let samples = vec![sample("S", 0, 10), sample("S", 5, 10), sample("S", 45, 10)];

        let outcome = processor
            .process(work(samples, Some(state("S", Tier::Hot))), &store)
            .unwrap();

        assert!(outcome.summary.tier.is_none());
        assert!(outcome.summary.cost_estimate.is_none());
        assert_eq!(outcome.storage_cost, 0.0);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::Tiering);
        assert!(outcome.diagnostics[0].message.contains("data_age_days"));
        assert_eq!(outcome.anomalies.len(), 1);
        assert_eq!(
            outcome.recommendations[0].recommendation_type,
            RecommendationType::DataGapRemediation
        );
        assert_eq!(store.get("S").unwrap().sample_count, 3);
    }

    #[test]
    fn test_empty_window_leaves_baseline_untouched() {
        let processor = processor(EngineConfig::default());
        let store = store();

        let result = processor.process(
            SourceWork {
                source: "S".to_string(),
                samples: vec![],
                state: None,
            },
            &store,
        );
        assert!(matches!(result, Err(AdvisorError::InvalidSample { .. })));
        assert!(store.get("S").is_none());
    }

    #[test]
    fn test_summary_carries_records_cost_and_patterns() {
        let processor = processor(EngineConfig::default());
        let mut samples = vec![
            sample("S", 0, gb(1.0)),
            sample("S", 60, gb(3.0)),
            sample("S", 24 * 60 + 120, gb(2.0)),
        ];
        for (i, s) in samples.iter_mut().enumerate() {
            s.record_count = 10 * (i as u64 + 1);
        }

        let outcome = processor
            .process(work(samples, Some(state("S", Tier::Warm))), &store())
            .unwrap();
        let summary = &outcome.summary;

        assert_eq!(summary.total_records, 60);
        // 3 GB/day over 30 days in warm storage
        let estimate = summary.cost_estimate.as_ref().unwrap();
        assert_eq!(estimate.tier, Tier::Warm);
        assert!((estimate.total_cost - 45.0).abs() < 1e-9);
        assert_eq!(outcome.storage_cost, estimate.total_cost);
        assert_eq!(summary.peak_hours, vec![1, 2, 0]);
        assert_eq!(summary.daily_volumes_gb.len(), 2);
        assert!((summary.daily_volumes_gb.values().sum::<f64>() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_detection_uses_prior_baseline() {
        let processor = processor(EngineConfig::default());
        let store = store();
        processor
            .process(work(vec![sample("S", 0, 100)], None), &store)
            .unwrap();

        let outcome = processor
            .process(work(vec![sample("S", 60 * 24, 1000)], None), &store)
            .unwrap();
        assert_eq!(outcome.anomalies[0].anomaly_type, AnomalyType::VolumeDeviation);
        assert!((outcome.summary.volume_deviation_percent.unwrap() - 900.0).abs() < 1e-9);
        assert_eq!(outcome.summary.baseline.sample_count, 2);
        assert!((outcome.summary.baseline.avg_volume - 550.0).abs() < 1e-9);
    }
}
