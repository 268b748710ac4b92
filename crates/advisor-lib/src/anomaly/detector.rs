//! Combined per-source anomaly detection

use std::collections::BTreeMap;

use serde_json::json;

use super::deviation::DeviationCheck;
use super::gap_detector::GapDetector;
use super::spike_detector::SpikeDetector;
use crate::config::Thresholds;
use crate::models::{Anomaly, AnomalyType, Baseline, MeasurementSample, Severity};

/// Runs deviation, spike and gap checks over one source's window
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    deviation_threshold_percent: f64,
    spikes: SpikeDetector,
    gaps: GapDetector,
}

impl AnomalyDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            deviation_threshold_percent: thresholds.deviation_threshold_percent,
            spikes: SpikeDetector::new(thresholds.spike_sigma),
            gaps: GapDetector::new(thresholds.max_gap_minutes),
        }
    }

    /// Detect anomalies in `samples` against the baseline from before this window
    ///
    /// Samples are sorted by timestamp first. Without a baseline only the
    /// spike and gap checks run.
    pub fn detect(
        &self,
        source: &str,
        samples: &[MeasurementSample],
        baseline: Option<&Baseline>,
    ) -> Vec<Anomaly> {
        if samples.is_empty() {
            return Vec::new();
        }

        let mut window: Vec<&MeasurementSample> = samples.iter().collect();
        window.sort_by_key(|s| s.timestamp);
        // Non-empty, checked above
        let latest = window[window.len() - 1].timestamp;

        let mut anomalies = Vec::new();

        if let Some(baseline) = baseline {
            let (volume, latency) = window_means(&window);

            let volume_check =
                DeviationCheck::evaluate(volume, baseline.avg_volume, self.deviation_threshold_percent);
            if volume_check.exceeded() {
                anomalies.push(deviation_anomaly(
                    source,
                    AnomalyType::VolumeDeviation,
                    latest,
                    &volume_check,
                ));
            }

            let latency_check = DeviationCheck::evaluate(
                latency,
                baseline.avg_latency,
                self.deviation_threshold_percent,
            );
            if latency_check.exceeded() {
                anomalies.push(deviation_anomaly(
                    source,
                    AnomalyType::LatencyDeviation,
                    latest,
                    &latency_check,
                ));
            }
        }

        let series: Vec<_> = window
            .iter()
            .map(|s| (s.timestamp, s.volume_bytes as f64))
            .collect();
        if let Some(spike) = self.spikes.detect(&series) {
            let mut details = BTreeMap::new();
            details.insert("value".to_string(), json!(spike.value));
            details.insert("mean".to_string(), json!(spike.expected));
            details.insert("std_dev".to_string(), json!(spike.std_dev));
            details.insert("upper_bound".to_string(), json!(spike.upper_bound));
            details.insert("sigma".to_string(), json!(spike.sigma));
            anomalies.push(Anomaly {
                source: source.to_string(),
                anomaly_type: AnomalyType::VolumeSpike,
                severity: Severity::Medium,
                timestamp: spike.timestamp,
                details,
            });
        }

        let timestamps: Vec<_> = window.iter().map(|s| s.timestamp).collect();
        for gap in self.gaps.detect(&timestamps) {
            let mut details = BTreeMap::new();
            details.insert("gap_start".to_string(), json!(gap.start));
            details.insert("gap_end".to_string(), json!(gap.end));
            details.insert("gap_minutes".to_string(), json!(gap.minutes()));
            details.insert(
                "max_gap_minutes".to_string(),
                json!(self.gaps.max_gap.num_milliseconds() as f64 / 60_000.0),
            );
            anomalies.push(Anomaly {
                source: source.to_string(),
                anomaly_type: AnomalyType::DataGap,
                severity: Severity::High,
                timestamp: gap.end,
                details,
            });
        }

        anomalies
    }
}

/// Mean volume (bytes) and latency (seconds) of a non-empty window
fn window_means(window: &[&MeasurementSample]) -> (f64, f64) {
    let n = window.len() as f64;
    let volume = window.iter().map(|s| s.volume_bytes as f64).sum::<f64>() / n;
    let latency = window.iter().map(|s| s.latency_seconds).sum::<f64>() / n;
    (volume, latency)
}

fn deviation_anomaly(
    source: &str,
    anomaly_type: AnomalyType,
    timestamp: chrono::DateTime<chrono::Utc>,
    check: &DeviationCheck,
) -> Anomaly {
    let mut details = BTreeMap::new();
    details.insert("current".to_string(), json!(check.current));
    details.insert("baseline".to_string(), json!(check.baseline));
    details.insert("deviation_percent".to_string(), json!(check.deviation_percent));
    details.insert("threshold_percent".to_string(), json!(check.threshold_percent));
    Anomaly {
        source: source.to_string(),
        anomaly_type,
        severity: Severity::High,
        timestamp,
        details,
    }
}
