//! Periodic cycle loop
//!
//! Runs a cycle on every tick and publishes the report to each sink. A
//! shutdown received mid-cycle stops the cycle cooperatively; the loop exits
//! once that cycle's report is published.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::cycle::{RecommendationEngine, StopSignal};
use super::report::CycleReport;
use super::sink::ReportSink;
use crate::error::{AdvisorError, AdvisorResult};
use crate::health::components;

/// Drives the engine on a fixed interval
pub struct CycleLoop {
    engine: Arc<RecommendationEngine>,
    sinks: Vec<Arc<dyn ReportSink>>,
    interval: Duration,
    stop: StopSignal,
}

impl CycleLoop {
    pub fn new(
        engine: Arc<RecommendationEngine>,
        sinks: Vec<Arc<dyn ReportSink>>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            sinks,
            interval,
            stop: StopSignal::new(),
        }
    }

    pub fn builder() -> CycleLoopBuilder {
        CycleLoopBuilder::new()
    }

    /// Handle that stops the loop after the in-flight cycle
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            sinks = self.sinks.len(),
            "Starting analysis cycle loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cycle = self.engine.run_cycle(&self.stop);
                    tokio::pin!(cycle);

                    let report = loop {
                        tokio::select! {
                            report = &mut cycle => break report,
                            _ = shutdown.recv(), if !self.stop.is_stopped() => {
                                info!("Shutdown requested, finishing in-flight cycle");
                                self.stop.stop();
                            }
                        }
                    };

                    self.publish(&report).await;

                    if self.stop.is_stopped() {
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down analysis cycle loop");
                    break;
                }
                _ = self.stop.stopped() => {
                    info!("Stop requested, leaving analysis cycle loop");
                    break;
                }
            }
        }
    }

    /// Run a single cycle and publish it
    pub async fn run_once(&self) -> CycleReport {
        let report = self.engine.run_cycle(&self.stop).await;
        self.publish(&report).await;
        report
    }

    async fn publish(&self, report: &CycleReport) {
        let mut failed = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(report).await {
                warn!(
                    sink = %sink.name(),
                    cycle_id = report.cycle_id,
                    error = %e,
                    "Failed to publish report"
                );
                failed = Some(format!("{}: {}", sink.name(), e));
            }
        }

        if let Some(health) = self.engine.health() {
            match failed {
                Some(message) => health.set_degraded(components::REPORT_SINK, message).await,
                None => health.set_healthy(components::REPORT_SINK).await,
            }
        }
    }
}

/// Builder for the cycle loop
pub struct CycleLoopBuilder {
    engine: Option<Arc<RecommendationEngine>>,
    sinks: Vec<Arc<dyn ReportSink>>,
    interval: Duration,
}

impl CycleLoopBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            sinks: Vec::new(),
            interval: Duration::from_secs(300),
        }
    }

    pub fn engine(mut self, engine: Arc<RecommendationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn build(self) -> AdvisorResult<CycleLoop> {
        let engine = self
            .engine
            .ok_or_else(|| AdvisorError::config("an engine is required"))?;
        if self.interval.is_zero() {
            return Err(AdvisorError::config("cycle interval must be positive"));
        }
        Ok(CycleLoop::new(engine, self.sinks, self.interval))
    }
}

impl Default for CycleLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
