//! One analysis cycle
//!
//! Collect a batch, fan per-source work out over bounded tasks, merge the
//! outcomes in source order, persist baselines and assemble the report.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::patterns::outlier_threshold;
use super::processor::{group_batch, SourceOutcome, SourceProcessor, SourceWork};
use super::report::{CycleReport, Diagnostic, DiagnosticKind, SkippedSource};
use super::retry::{duration_ms, retry_with_backoff, RetryPolicy};
use crate::baseline::{BaselinePersistence, BaselineStore, MemoryPersistence};
use crate::config::EngineConfig;
use crate::cost::{CostImpact, CostSummary};
use crate::error::{AdvisorError, AdvisorResult};
use crate::health::{components, HealthRegistry};
use crate::models::{MetricsBatch, Observation, Recommendation, RecommendationType, Tier};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use crate::provider::MetricsProvider;

/// Runtime settings for cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSettings {
    /// Maximum sources analyzed at once
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Soft budget for one cycle; sources not started by then are skipped
    #[serde(default = "default_cycle_budget", with = "duration_ms")]
    pub cycle_budget: Duration,

    #[serde(default)]
    pub provider_retry: RetryPolicy,

    #[serde(default)]
    pub persistence_retry: RetryPolicy,
}

fn default_concurrency_limit() -> usize {
    8
}

fn default_cycle_budget() -> Duration {
    Duration::from_secs(240)
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            cycle_budget: default_cycle_budget(),
            provider_retry: RetryPolicy::default(),
            persistence_retry: RetryPolicy::default(),
        }
    }
}

impl CycleSettings {
    pub fn validate(&self) -> AdvisorResult<()> {
        if self.concurrency_limit == 0 {
            return Err(AdvisorError::config("concurrency_limit must be at least 1"));
        }
        if self.cycle_budget.is_zero() {
            return Err(AdvisorError::config("cycle_budget must be positive"));
        }
        for (name, policy) in [
            ("provider_retry", &self.provider_retry),
            ("persistence_retry", &self.persistence_retry),
        ] {
            if policy.max_attempts == 0 {
                return Err(AdvisorError::config(format!(
                    "{}.max_attempts must be at least 1",
                    name
                )));
            }
            if policy.attempt_timeout.is_zero() {
                return Err(AdvisorError::config(format!(
                    "{}.attempt_timeout must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Cooperative stop request shared between the loop and running cycles
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        let notified = self.notify.notified();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

enum TaskOutcome {
    Done(Box<SourceOutcome>),
    Skipped(SkippedSource),
}

/// Periodic baselining, detection and recommendation engine
pub struct RecommendationEngine {
    provider: Arc<dyn MetricsProvider>,
    store: Arc<BaselineStore>,
    processor: Arc<SourceProcessor>,
    settings: CycleSettings,
    health: Option<HealthRegistry>,
    metrics: AdvisorMetrics,
    logger: StructuredLogger,
    cycles: AtomicU64,
}

impl RecommendationEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn store(&self) -> &Arc<BaselineStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        self.processor.config()
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn health(&self) -> Option<&HealthRegistry> {
        self.health.as_ref()
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Run one cycle; always yields a report
    pub async fn run_cycle(&self, stop: &StopSignal) -> CycleReport {
        let started = Instant::now();
        let deadline = started + self.settings.cycle_budget;
        let cycle_timestamp = Utc::now();
        let cycle_id = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let mut diagnostics = Vec::new();
        let mut degraded = false;

        let batch = match retry_with_backoff(&self.settings.provider_retry, "metrics fetch", || {
            self.provider.fetch_batch()
        })
        .await
        {
            Ok(batch) => {
                self.set_health(components::PROVIDER, None).await;
                batch
            }
            Err(e) => {
                warn!(
                    cycle_id = cycle_id,
                    provider = %self.provider.name(),
                    error = %e,
                    "Metrics fetch failed, continuing with last-known baselines"
                );
                self.metrics.inc_provider_errors();
                self.set_health(components::PROVIDER, Some(e.to_string())).await;
                diagnostics.push(Diagnostic::new(DiagnosticKind::Provider, e.to_string()));
                degraded = true;
                MetricsBatch::default()
            }
        };

        let sample_count = batch.samples.len();
        let (work, mut skipped, input_diagnostics) = group_batch(batch);
        diagnostics.extend(input_diagnostics);
        self.logger
            .log_cycle_started(cycle_id, sample_count, work.len());

        let (mut outcomes, task_skips, task_diagnostics) = self.fan_out(work, stop, deadline).await;
        skipped.extend(task_skips);
        diagnostics.extend(task_diagnostics);

        outcomes.sort_by(|a, b| a.summary.source.cmp(&b.summary.source));
        skipped.sort_by(|a, b| a.source.cmp(&b.source));
        for outcome in &mut outcomes {
            diagnostics.append(&mut outcome.diagnostics);
        }

        // Folded sources are in the store now; the provider may stop resending them
        let folded: Vec<String> = outcomes.iter().map(|o| o.summary.source.clone()).collect();
        if let Err(e) = self.provider.commit(&folded).await {
            warn!(
                cycle_id = cycle_id,
                provider = %self.provider.name(),
                error = %e,
                "Provider commit failed, samples may be delivered again"
            );
            diagnostics.push(Diagnostic::new(DiagnosticKind::Provider, e.to_string()));
        }

        match retry_with_backoff(&self.settings.persistence_retry, "baseline save", || {
            self.store.save()
        })
        .await
        {
            Ok(()) => self.set_health(components::BASELINE_STORE, None).await,
            Err(e) => {
                self.metrics.inc_persistence_errors();
                self.logger
                    .log_baseline_save_failed(e.attempts, &e.last_error.to_string());
                self.set_health(components::BASELINE_STORE, Some(e.to_string()))
                    .await;
                diagnostics.push(Diagnostic::new(DiagnosticKind::Persistence, e.to_string()));
                degraded = true;
            }
        }

        if stop.is_stopped() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::Stopped,
                "stop requested; sources not yet started were skipped",
            ));
        }

        let report = self.assemble(
            cycle_id,
            cycle_timestamp,
            started.elapsed(),
            outcomes,
            skipped,
            diagnostics,
            degraded,
        );
        self.set_health(
            components::ENGINE,
            report.degraded.then(|| "last cycle degraded".to_string()),
        )
        .await;
        report
    }

    async fn fan_out(
        &self,
        work: Vec<SourceWork>,
        stop: &StopSignal,
        deadline: Instant,
    ) -> (Vec<SourceOutcome>, Vec<SkippedSource>, Vec<Diagnostic>) {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency_limit));
        let halted = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        let mut sources = HashMap::with_capacity(work.len());

        for unit in work {
            let processor = self.processor.clone();
            let store = self.store.clone();
            let semaphore = semaphore.clone();
            let halted = halted.clone();
            let stop = stop.clone();
            let name = unit.source.clone();

            let handle = tasks.spawn(async move {
                let source = unit.source.clone();
                let skip = |reason: &str| {
                    TaskOutcome::Skipped(SkippedSource {
                        source: source.clone(),
                        reason: reason.to_string(),
                    })
                };

                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return skip("worker pool closed"),
                };
                if stop.is_stopped() {
                    return skip("stop requested before processing");
                }
                if halted.load(Ordering::SeqCst) {
                    return skip("cycle budget exceeded before processing");
                }

                match processor.process(unit, &store) {
                    Ok(outcome) => TaskOutcome::Done(Box::new(outcome)),
                    Err(e) => {
                        debug!(source_id = %source, error = %e, "Source skipped");
                        skip(&e.to_string())
                    }
                }
            });
            sources.insert(handle.id(), name);
        }

        let mut outcomes = Vec::new();
        let mut skipped = Vec::new();
        let mut diagnostics = Vec::new();
        let mut over_budget = false;

        loop {
            let next = if over_budget {
                tasks.join_next_with_id().await
            } else {
                match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                    Ok(next) => next,
                    Err(_) => {
                        over_budget = true;
                        halted.store(true, Ordering::SeqCst);
                        warn!(
                            budget_ms = self.settings.cycle_budget.as_millis() as u64,
                            remaining_tasks = tasks.len(),
                            "Cycle exceeded its budget, skipping sources not yet started"
                        );
                        self.metrics.inc_soft_timeouts();
                        diagnostics.push(Diagnostic::new(
                            DiagnosticKind::SoftTimeout,
                            format!(
                                "cycle exceeded budget of {}ms",
                                self.settings.cycle_budget.as_millis()
                            ),
                        ));
                        continue;
                    }
                }
            };

            match next {
                None => break,
                Some(Ok((_, TaskOutcome::Done(outcome)))) => outcomes.push(*outcome),
                Some(Ok((_, TaskOutcome::Skipped(skip)))) => skipped.push(skip),
                Some(Err(e)) => {
                    let (skip, diagnostic) = task_failure(&mut sources, &e);
                    warn!(source_id = %skip.source, error = %e, "Source task failed");
                    skipped.push(skip);
                    diagnostics.push(diagnostic);
                }
            }
        }

        (outcomes, skipped, diagnostics)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        cycle_id: u64,
        cycle_timestamp: chrono::DateTime<Utc>,
        elapsed: Duration,
        outcomes: Vec<SourceOutcome>,
        skipped: Vec<SkippedSource>,
        diagnostics: Vec<Diagnostic>,
        degraded: bool,
    ) -> CycleReport {
        let config = self.processor.config();
        let mut summaries = Vec::with_capacity(outcomes.len());
        let mut anomalies = Vec::new();
        let mut recommendations = Vec::new();
        let mut ingested_gb = 0.0;
        let mut storage = 0.0;
        let mut query = 0.0;

        for outcome in outcomes {
            ingested_gb += outcome.summary.total_volume_gb;
            storage += outcome.storage_cost;
            query += outcome.query_cost;
            anomalies.extend(outcome.anomalies);
            recommendations.extend(outcome.recommendations);
            summaries.push(outcome.summary);
        }

        let volumes: Vec<f64> = summaries.iter().map(|s| s.total_volume_gb).collect();
        if let Some(threshold) =
            outlier_threshold(&volumes, config.thresholds.table_outlier_sigma)
        {
            for summary in summaries.iter().filter(|s| s.total_volume_gb > threshold) {
                recommendations.push(Recommendation::new(
                    RecommendationType::TableOptimization,
                    &summary.source,
                    Observation::Threshold {
                        current_value: summary.total_volume_gb,
                        threshold,
                    },
                    0.0,
                    format!(
                        "Review retention and collection filters for {}, an outlier by volume",
                        summary.source
                    ),
                ));
            }
            recommendations.sort_by(|a, b| a.target.cmp(&b.target));
        }

        let hot_rate = config.rates.rate(Tier::Hot).unwrap_or(0.0);
        let current_monthly_cost: f64 = summaries
            .iter()
            .map(|s| match &s.cost_estimate {
                Some(estimate) => estimate.total_cost,
                None => s.daily_avg_gb * config.billing_period_days * hot_rate,
            })
            .sum();
        let tier_savings: f64 = recommendations
            .iter()
            .filter(|r| r.recommendation_type == RecommendationType::StorageTierOptimization)
            .map(|r| r.estimated_savings)
            .sum();

        for anomaly in &anomalies {
            self.logger.log_anomaly(anomaly);
            self.metrics.inc_anomaly(&anomaly.anomaly_type.to_string());
        }
        for recommendation in &recommendations {
            self.logger.log_recommendation(recommendation);
            self.metrics
                .inc_recommendation(&recommendation.recommendation_type.to_string());
        }

        let total_estimated_savings = recommendations.iter().map(|r| r.estimated_savings).sum();
        let duration_ms = elapsed.as_millis() as u64;

        self.metrics
            .observe_cycle(elapsed.as_secs_f64(), summaries.len(), skipped.len());
        self.metrics.set_estimated_savings(total_estimated_savings);
        self.metrics.set_baselines_tracked(self.store.len());
        self.logger.log_cycle_completed(
            cycle_id,
            duration_ms,
            anomalies.len(),
            recommendations.len(),
            skipped.len(),
            degraded,
        );

        CycleReport {
            cycle_id,
            cycle_timestamp,
            duration_ms,
            summaries,
            anomalies,
            recommendations,
            skipped,
            diagnostics,
            cost_summary: CostSummary::new(ingested_gb * config.ingestion_rate_per_gb, storage, query),
            cost_impact: CostImpact::new(current_monthly_cost, tier_savings),
            total_estimated_savings,
            degraded,
        }
    }

    async fn set_health(&self, component: &str, problem: Option<String>) {
        if let Some(health) = &self.health {
            match problem {
                None => health.set_healthy(component).await,
                Some(message) => health.set_degraded(component, message).await,
            }
        }
    }
}

/// Attribute a panicked or cancelled task to the source it was analyzing
pub(super) fn task_failure(
    sources: &mut HashMap<task::Id, String>,
    error: &JoinError,
) -> (SkippedSource, Diagnostic) {
    let source = sources
        .remove(&error.id())
        .unwrap_or_else(|| "<unknown>".to_string());
    let diagnostic = Diagnostic::new(DiagnosticKind::Task, format!("{}: {}", source, error));
    let skip = SkippedSource {
        source,
        reason: format!("task failed: {}", error),
    };
    (skip, diagnostic)
}

/// Builder for the recommendation engine
pub struct EngineBuilder {
    config: EngineConfig,
    settings: CycleSettings,
    provider: Option<Arc<dyn MetricsProvider>>,
    persistence: Option<Arc<dyn BaselinePersistence>>,
    store: Option<Arc<BaselineStore>>,
    health: Option<HealthRegistry>,
    instance: String,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            settings: CycleSettings::default(),
            provider: None,
            persistence: None,
            store: None,
            health: None,
            instance: "ingestion-advisor".to_string(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn settings(mut self, settings: CycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Load baselines from this persistence when building
    pub fn persistence(mut self, persistence: Arc<dyn BaselinePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Use an already loaded store; takes precedence over `persistence`
    pub fn store(mut self, store: Arc<BaselineStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Validate configuration and load baselines
    pub async fn build(self) -> AdvisorResult<RecommendationEngine> {
        self.config.validate()?;
        self.settings.validate()?;

        let provider = self
            .provider
            .ok_or_else(|| AdvisorError::config("a metrics provider is required"))?;

        let store = match (self.store, self.persistence) {
            (Some(store), _) => store,
            (None, Some(persistence)) => Arc::new(BaselineStore::load(persistence).await?),
            (None, None) => Arc::new(BaselineStore::new(Arc::new(MemoryPersistence::default()))),
        };

        if let Some(health) = &self.health {
            health.register(components::PROVIDER).await;
            health.register(components::ENGINE).await;
            health.register(components::BASELINE_STORE).await;
            health.set_baselines_loaded(true).await;
        }

        info!(
            baselines = store.len(),
            concurrency_limit = self.settings.concurrency_limit,
            strategy = ?self.config.tiers.strategy,
            "Recommendation engine ready"
        );

        Ok(RecommendationEngine {
            provider,
            store,
            processor: Arc::new(SourceProcessor::new(Arc::new(self.config))),
            settings: self.settings,
            health: self.health,
            metrics: AdvisorMetrics::new(),
            logger: StructuredLogger::new(self.instance),
            cycles: AtomicU64::new(0),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
