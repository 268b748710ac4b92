//! Recommendation engine
//!
//! This module provides:
//! - Per-source analysis (summary, anomalies, recommendations)
//! - Ingestion patterns (peak hours, daily volumes, outlier sources)
//! - Cycle orchestration with bounded concurrency and a soft time budget
//! - Timeout and retry around the provider and baseline persistence
//! - The periodic loop and report sinks

mod cycle;
mod patterns;
mod processor;
mod report;
mod retry;
mod scheduler;
mod sink;


pub use cycle::{CycleSettings, EngineBuilder, RecommendationEngine, StopSignal};
pub use patterns::{daily_volumes_gb, outlier_threshold, peak_hours, PEAK_HOUR_COUNT};
pub use processor::{group_batch, SourceOutcome, SourceProcessor, SourceWork, VolumeStats};
pub use report::{CycleReport, Diagnostic, DiagnosticKind, SkippedSource, SourceSummary};
pub use retry::{retry_with_backoff, RetryExhausted, RetryPolicy};
pub use scheduler::{CycleLoop, CycleLoopBuilder};
pub use sink::{JsonDirectorySink, LatestReportSink, ReportSink};
