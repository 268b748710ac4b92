//! Volume spike detection
//!
//! Compares the last volume sample of a window against the mean and
//! population standard deviation of every sample before it.

use chrono::{DateTime, Utc};

/// Minimum samples (trailing history plus the candidate) for a verdict
pub const MIN_SAMPLES_FOR_SPIKE: usize = 3;

/// Detects a final sample exceeding `mean + sigma * std_dev` of its history
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    /// Number of standard deviations to consider a spike
    pub sigma: f64,
}

impl SpikeDetector {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }

    /// Check the last point of a chronologically ordered series
    ///
    /// # Returns
    /// * `Some(SpikeAnomaly)` if the last value is above the trailing band
    /// * `None` if it is not, or if there are fewer than three points
    pub fn detect(&self, series: &[(DateTime<Utc>, f64)]) -> Option<SpikeAnomaly> {
        if series.len() < MIN_SAMPLES_FOR_SPIKE {
            return None;
        }

        let (history, last) = series.split_at(series.len() - 1);
        let (timestamp, value) = last[0];
        let stats = TrailingStats::from_values(history.iter().map(|(_, v)| *v));
        let upper_bound = stats.mean + self.sigma * stats.std_dev;

        if value > upper_bound {
            Some(SpikeAnomaly {
                timestamp,
                value,
                expected: stats.mean,
                std_dev: stats.std_dev,
                upper_bound,
                sigma: self.sigma,
            })
        } else {
            None
        }
    }
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self { sigma: 3.0 }
    }
}

/// Mean and population standard deviation of a trailing window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl TrailingStats {
    pub fn from_values(values: impl Iterator<Item = f64> + Clone) -> Self {
        let count = values.clone().count();
        if count == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                count: 0,
            };
        }

        let mean = values.clone().sum::<f64>() / count as f64;
        // Two-pass population variance
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            mean,
            std_dev: variance.sqrt(),
            count,
        }
    }
}

/// Spike details
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeAnomaly {
    pub timestamp: DateTime<Utc>,
    /// Volume of the spiking sample
    pub value: f64,
    /// Trailing mean
    pub expected: f64,
    pub std_dev: f64,
    /// `expected + sigma * std_dev`
    pub upper_bound: f64,
    pub sigma: f64,
}

impl SpikeAnomaly {
    /// Z-score of the spike; `None` when the history had no variance
    pub fn z_score(&self) -> Option<f64> {
        if self.std_dev < f64::EPSILON {
            None
        } else {
            Some((self.value - self.expected) / self.std_dev)
        }
    }

    pub fn percentage_above_expected(&self) -> f64 {
        if self.expected < f64::EPSILON {
            return 0.0;
        }
        ((self.value - self.expected) / self.expected) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn series(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::minutes(5 * i as i64), *v))
            .collect()
    }

    #[test]
    fn test_flat_series_has_no_spike() {
        let detector = SpikeDetector::default();
        assert!(detector.detect(&series(&[10.0, 10.0, 10.0, 10.0])).is_none());
    }

    #[test]
    fn test_detect_spike_on_last_element() {
        let detector = SpikeDetector::default();
        let input = series(&[10.0, 10.0, 10.0, 1000.0]);
        let spike = detector.detect(&input).expect("spike expected");

        assert_eq!(spike.timestamp, input[3].0);
        assert_eq!(spike.value, 1000.0);
        assert_eq!(spike.expected, 10.0);
        assert_eq!(spike.std_dev, 0.0);
        assert!(spike.z_score().is_none());
        assert!((spike.percentage_above_expected() - 9900.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_samples() {
        let detector = SpikeDetector::default();
        assert!(detector.detect(&series(&[10.0, 1000.0])).is_none());
        assert!(detector.detect(&series(&[])).is_none());
    }

    #[test]
    fn test_within_band_is_not_a_spike() {
        // mean 10, population std dev 2 -> band tops out at 16
        let detector = SpikeDetector::default();
        assert!(detector.detect(&series(&[8.0, 12.0, 8.0, 12.0, 16.0])).is_none());

        let spike = detector
            .detect(&series(&[8.0, 12.0, 8.0, 12.0, 16.5]))
            .expect("spike expected");
        assert!((spike.upper_bound - 16.0).abs() < 1e-9);
        assert!((spike.z_score().unwrap() - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_stats_population() {
        let stats = TrailingStats::from_values([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter());
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert!((stats.std_dev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_custom_sigma() {
        let detector = SpikeDetector::new(1.0);
        assert!(detector.detect(&series(&[8.0, 12.0, 8.0, 12.0, 12.5])).is_some());
    }
}
