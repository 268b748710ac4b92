//! Ingestion Advisor - ingestion baselining and cost recommendation daemon
//!
//! Reads metrics batches on a fixed interval, keeps per-source baselines,
//! and publishes anomalies and tiering recommendations.

use advisor_lib::{
    health::{components, HealthRegistry},
    observability::AdvisorMetrics,
    CycleLoop, JsonDirectorySink, JsonFileProvider, JsonFileStore, LatestReportSink,
    RecommendationEngine, ReportSink,
};
use anyhow::{Context, Result};
use ingestion_advisor::{api, config::AdvisorSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ADVISOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting ingestion-advisor");

    let settings = AdvisorSettings::load()?;
    info!(
        instance = %settings.instance,
        batch_path = %settings.batch_path.display(),
        state_path = %settings.state_path.display(),
        interval_secs = settings.cycle_interval_secs,
        "Advisor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::REPORT_SINK).await;

    let engine = RecommendationEngine::builder()
        .provider(Arc::new(JsonFileProvider::new(&settings.batch_path)))
        .persistence(Arc::new(JsonFileStore::new(&settings.state_path)))
        .config(settings.engine.clone())
        .settings(settings.cycle.clone())
        .health(health_registry.clone())
        .instance(settings.instance.clone())
        .build()
        .await
        .context("failed to initialize recommendation engine")?;
    let engine = Arc::new(engine);

    let latest_report = LatestReportSink::new();
    let mut loop_builder = CycleLoop::builder()
        .engine(engine.clone())
        .sink(Arc::new(latest_report.clone()) as Arc<dyn ReportSink>)
        .interval(Duration::from_secs(settings.cycle_interval_secs));
    if let Some(dir) = &settings.report_dir {
        loop_builder = loop_builder.sink(Arc::new(JsonDirectorySink::new(dir)));
    }
    let cycle_loop = loop_builder.build()?;

    let metrics = AdvisorMetrics::new();
    metrics.set_baselines_tracked(engine.store().len());

    let logger = engine.logger().clone();
    logger.log_startup(ADVISOR_VERSION, engine.store().len());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        latest_report,
        engine.store().clone(),
    ));

    health_registry.set_ready(true).await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(cycle_loop.run(shutdown_rx));
    let api_handle = tokio::spawn(api::serve(settings.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // The loop finishes its in-flight cycle and saves baselines before exiting
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Cycle loop terminated abnormally");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
