//! Ingestion metrics advisor library
//!
//! This crate provides the core functionality for:
//! - Rolling per-source baselines with durable state
//! - Anomaly detection (deviation, spikes, data gaps)
//! - Storage tier classification and cost estimation
//! - Periodic recommendation cycles over a pluggable metrics provider
//! - Health checks and observability

pub mod anomaly;
pub mod baseline;
pub mod config;
pub mod cost;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod provider;
pub mod tiering;

pub use baseline::{BaselinePersistence, BaselineStore, JsonFileStore, MemoryPersistence};
pub use config::{EngineConfig, RateTable, Thresholds, TierConfig};
pub use cost::{CostImpact, CostModel, CostSummary};
pub use engine::{
    CycleLoop, CycleReport, CycleSettings, JsonDirectorySink, LatestReportSink,
    RecommendationEngine, ReportSink, StopSignal,
};
pub use error::{AdvisorError, AdvisorResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AdvisorMetrics, StructuredLogger};
pub use provider::{JsonFileProvider, MetricsProvider, StaticProvider};
