//! Observability for the ingestion advisor
//!
//! Provides:
//! - Prometheus metrics (cycle duration, per-cycle counts, error counters)
//! - Structured event logging with tracing

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{Anomaly, Recommendation, Severity};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<AdvisorMetricsInner> = OnceLock::new();

struct AdvisorMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    sources_processed: IntGauge,
    sources_skipped: IntGauge,
    anomalies_detected: IntCounterVec,
    recommendations_emitted: IntCounterVec,
    provider_errors: IntCounter,
    persistence_errors: IntCounter,
    soft_timeouts: IntCounter,
    estimated_savings: Gauge,
    baselines_tracked: IntGauge,
}

impl AdvisorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "ingestion_advisor_cycle_duration_seconds",
                "Wall time of one analysis cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter!(
                "ingestion_advisor_cycles_total",
                "Completed analysis cycles"
            )
            .expect("Failed to register cycles_total"),

            sources_processed: register_int_gauge!(
                "ingestion_advisor_sources_processed",
                "Sources analyzed in the last cycle"
            )
            .expect("Failed to register sources_processed"),

            sources_skipped: register_int_gauge!(
                "ingestion_advisor_sources_skipped",
                "Sources skipped in the last cycle"
            )
            .expect("Failed to register sources_skipped"),

            anomalies_detected: register_int_counter_vec!(
                "ingestion_advisor_anomalies_detected_total",
                "Anomalies detected, by type",
                &["anomaly_type"]
            )
            .expect("Failed to register anomalies_detected"),

            recommendations_emitted: register_int_counter_vec!(
                "ingestion_advisor_recommendations_total",
                "Recommendations emitted, by type",
                &["recommendation_type"]
            )
            .expect("Failed to register recommendations_emitted"),

            provider_errors: register_int_counter!(
                "ingestion_advisor_provider_errors_total",
                "Metrics provider fetches that exhausted their retries"
            )
            .expect("Failed to register provider_errors"),

            persistence_errors: register_int_counter!(
                "ingestion_advisor_persistence_errors_total",
                "Baseline saves that exhausted their retries"
            )
            .expect("Failed to register persistence_errors"),

            soft_timeouts: register_int_counter!(
                "ingestion_advisor_soft_timeouts_total",
                "Cycles that exceeded their time budget"
            )
            .expect("Failed to register soft_timeouts"),

            estimated_savings: register_gauge!(
                "ingestion_advisor_estimated_savings",
                "Total estimated savings of the last cycle's recommendations"
            )
            .expect("Failed to register estimated_savings"),

            baselines_tracked: register_int_gauge!(
                "ingestion_advisor_baselines_tracked",
                "Sources with a baseline"
            )
            .expect("Failed to register baselines_tracked"),
        }
    }
}

/// Handle to the process-wide advisor metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct AdvisorMetrics {
    _private: (),
}

impl Default for AdvisorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorMetrics {
    /// Create a handle, registering the metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AdvisorMetricsInner {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new)
    }

    pub fn observe_cycle(&self, duration_secs: f64, processed: usize, skipped: usize) {
        let inner = self.inner();
        inner.cycle_duration_seconds.observe(duration_secs);
        inner.cycles_total.inc();
        inner.sources_processed.set(processed as i64);
        inner.sources_skipped.set(skipped as i64);
    }

    pub fn inc_anomaly(&self, anomaly_type: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[anomaly_type])
            .inc();
    }

    pub fn inc_recommendation(&self, recommendation_type: &str) {
        self.inner()
            .recommendations_emitted
            .with_label_values(&[recommendation_type])
            .inc();
    }

    pub fn inc_provider_errors(&self) {
        self.inner().provider_errors.inc();
    }

    pub fn inc_persistence_errors(&self) {
        self.inner().persistence_errors.inc();
    }

    pub fn inc_soft_timeouts(&self) {
        self.inner().soft_timeouts.inc();
    }

    pub fn set_estimated_savings(&self, savings: f64) {
        self.inner().estimated_savings.set(savings);
    }

    pub fn set_baselines_tracked(&self, count: usize) {
        self.inner().baselines_tracked.set(count as i64);
    }
}

/// Structured logger for advisor events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_cycle_started(&self, cycle_id: u64, samples: usize, sources: usize) {
        info!(
            event = "cycle_started",
            instance = %self.instance,
            cycle_id = cycle_id,
            samples = samples,
            sources = sources,
            "Analysis cycle started"
        );
    }

    pub fn log_cycle_completed(
        &self,
        cycle_id: u64,
        duration_ms: u64,
        anomalies: usize,
        recommendations: usize,
        skipped: usize,
        degraded: bool,
    ) {
        info!(
            event = "cycle_completed",
            instance = %self.instance,
            cycle_id = cycle_id,
            duration_ms = duration_ms,
            anomalies = anomalies,
            recommendations = recommendations,
            skipped = skipped,
            degraded = degraded,
            "Analysis cycle completed"
        );
    }

    /// High severity anomalies log at warn, the rest at info
    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        let details = serde_json::to_string(&anomaly.details).unwrap_or_default();
        match anomaly.severity {
            Severity::High => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    source_id = %anomaly.source,
                    anomaly_type = %anomaly.anomaly_type,
                    severity = %anomaly.severity,
                    timestamp = %anomaly.timestamp,
                    details = %details,
                    "High severity anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    source_id = %anomaly.source,
                    anomaly_type = %anomaly.anomaly_type,
                    severity = %anomaly.severity,
                    timestamp = %anomaly.timestamp,
                    details = %details,
                    "Anomaly detected"
                );
            }
        }
    }

    pub fn log_recommendation(&self, recommendation: &Recommendation) {
        info!(
            event = "recommendation_emitted",
            instance = %self.instance,
            recommendation_type = %recommendation.recommendation_type,
            target = %recommendation.target,
            impact = %recommendation.impact,
            estimated_savings = recommendation.estimated_savings,
            "Recommendation emitted"
        );
    }

    pub fn log_baseline_save_failed(&self, attempts: u32, error: &str) {
        warn!(
            event = "baseline_save_failed",
            instance = %self.instance,
            attempts = attempts,
            error = %error,
            "Baseline save failed, keeping in-memory state"
        );
    }

    pub fn log_startup(&self, version: &str, sources: usize) {
        info!(
            event = "advisor_started",
            instance = %self.instance,
            advisor_version = %version,
            baselines = sources,
            "Ingestion advisor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "advisor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Ingestion advisor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyType, Observation, RecommendationType};
    use chrono::Utc;

    #[test]
    fn test_advisor_metrics_are_shared() {
        let metrics = AdvisorMetrics::new();
        let clone = metrics.clone();

        metrics.observe_cycle(0.2, 3, 1);
        clone.inc_anomaly("volume_spike");
        clone.inc_recommendation("high_ingestion");
        metrics.inc_provider_errors();
        metrics.inc_persistence_errors();
        metrics.inc_soft_timeouts();
        metrics.set_estimated_savings(12.5);
        metrics.set_baselines_tracked(3);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "ingestion_advisor_cycle_duration_seconds"));
    }

    #[test]
    fn test_structured_logger_events() {
        let logger = StructuredLogger::new("advisor-test");
        assert_eq!(logger.instance, "advisor-test");

        let anomaly = Anomaly {
            source: "Syslog".to_string(),
            anomaly_type: AnomalyType::DataGap,
            severity: Severity::High,
            timestamp: Utc::now(),
            details: Default::default(),
        };
        logger.log_anomaly(&anomaly);

        let recommendation = Recommendation::new(
            RecommendationType::QueryOptimization,
            "Syslog",
            Observation::Threshold {
                current_value: 80.0,
                threshold: 50.0,
            },
            30.0,
            "Review query patterns",
        );
        logger.log_recommendation(&recommendation);
        logger.log_baseline_save_failed(3, "disk full");
    }
}
