//! Ingestion pattern figures
//!
//! Hour-of-day peaks and per-day volumes for one source, plus the
//! cross-source volume cut used for table optimization.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Timelike};

use crate::models::MeasurementSample;

/// Number of peak hours reported per source
pub const PEAK_HOUR_COUNT: usize = 3;

/// UTC hours with the highest mean sample volume, busiest first
///
/// Ties go to the earlier hour.
pub fn peak_hours(samples: &[MeasurementSample], count: usize) -> Vec<u32> {
    let mut by_hour: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for sample in samples {
        let entry = by_hour.entry(sample.timestamp.hour()).or_insert((0.0, 0));
        entry.0 += sample.volume_bytes as f64;
        entry.1 += 1;
    }

    let mut means: Vec<(u32, f64)> = by_hour
        .into_iter()
        .map(|(hour, (total, n))| (hour, total / n as f64))
        .collect();
    means.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    means.into_iter().take(count).map(|(hour, _)| hour).collect()
}

/// Total GB per UTC day
pub fn daily_volumes_gb(samples: &[MeasurementSample]) -> BTreeMap<NaiveDate, f64> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for sample in samples {
        *days.entry(sample.timestamp.date_naive()).or_insert(0.0) += sample.volume_gb();
    }
    days
}

/// Volume above which a source stands out from its peers
///
/// `mean + sigma * s` over the given volumes, where `s` is the sample
/// standard deviation. `None` with fewer than two volumes or no spread.
pub fn outlier_threshold(volumes: &[f64], sigma: f64) -> Option<f64> {
    if volumes.len() < 2 {
        return None;
    }
    let n = volumes.len() as f64;
    let mean = volumes.iter().sum::<f64>() / n;
    let variance = volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if !std_dev.is_finite() || std_dev == 0.0 {
        return None;
    }
    Some(mean + sigma * std_dev)
}
