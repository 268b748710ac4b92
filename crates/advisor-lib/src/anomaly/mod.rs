//! Anomaly detection for ingestion metrics
//!
//! This module provides detection for:
//! - Volume and latency deviation from a source's baseline
//! - Volume spikes (last sample far above the trailing mean)
//! - Data gaps (intervals between samples longer than allowed)
//!
//! Every detector is a pure function of its inputs.

mod deviation;
mod detector;
mod gap_detector;
mod spike_detector;

pub use deviation::{deviation_percent, DeviationCheck};
pub use detector::AnomalyDetector;
pub use gap_detector::{DataGap, GapDetector};
pub use spike_detector::{SpikeAnomaly, SpikeDetector, TrailingStats, MIN_SAMPLES_FOR_SPIKE};
