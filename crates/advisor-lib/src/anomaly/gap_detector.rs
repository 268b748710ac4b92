//! Data gap detection

use chrono::{DateTime, Duration, Utc};

/// One interval between consecutive samples that exceeded the allowed gap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataGap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DataGap {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn minutes(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 60_000.0
    }
}

/// Finds intervals between consecutive timestamps longer than `max_gap`
#[derive(Debug, Clone)]
pub struct GapDetector {
    pub max_gap: Duration,
}

impl GapDetector {
    pub fn new(max_gap_minutes: f64) -> Self {
        Self {
            max_gap: Duration::milliseconds((max_gap_minutes * 60_000.0).round() as i64),
        }
    }

    /// Report each oversized interval once, whatever its length
    pub fn detect(&self, timestamps: &[DateTime<Utc>]) -> Vec<DataGap> {
        let mut sorted = timestamps.to_vec();
        sorted.sort();

        sorted
            .windows(2)
            .filter(|pair| pair[1] - pair[0] > self.max_gap)
            .map(|pair| DataGap {
                start: pair[0],
                end: pair[1],
            })
            .collect()
    }
}

impl Default for GapDetector {
    fn default() -> Self {
        Self::new(10.0)
    }
}
