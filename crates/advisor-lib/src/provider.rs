//! Metrics providers
//!
//! A provider hands the engine one `MetricsBatch` per cycle. Providers are
//! the only place external data enters the engine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{AdvisorError, AdvisorResult};
use crate::models::MetricsBatch;

/// Trait for metrics sources feeding the engine
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Fetch the samples and source inventory for one cycle
    async fn fetch_batch(&self) -> AdvisorResult<MetricsBatch>;

    /// Acknowledge that the last batch's samples for `sources` were folded
    /// into baselines. Samples of sources left out may be delivered again.
    async fn commit(&self, _sources: &[String]) -> AdvisorResult<()> {
        Ok(())
    }

    /// Short name used in logs and diagnostics
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
struct Delivery {
    /// Samples folded by a committed cycle, keyed by source
    committed: HashMap<String, HashSet<DateTime<Utc>>>,
    /// Samples handed out by the last fetch and not yet committed
    pending: HashMap<String, HashSet<DateTime<Utc>>>,
}

/// Reads a batch file and yields the samples no cycle has committed yet
///
/// Delivery is tracked per `(source, timestamp)`, so a late sample with an
/// older timestamp is still delivered, and a source that was not folded
/// (skipped, failed or cut by the cycle budget) is delivered again on the
/// next fetch. Committed keys that disappear from the file are forgotten.
#[derive(Debug)]
pub struct JsonFileProvider {
    path: PathBuf,
    delivery: Mutex<Delivery>,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delivery: Mutex::new(Delivery::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetricsProvider for JsonFileProvider {
    async fn fetch_batch(&self) -> AdvisorResult<MetricsBatch> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            AdvisorError::provider(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let mut batch = MetricsBatch::from_json(&data).map_err(|e| {
            AdvisorError::provider(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        let mut delivery = self
            .delivery
            .lock()
            .map_err(|_| AdvisorError::provider("delivery lock poisoned"))?;

        let mut present: HashMap<String, HashSet<DateTime<Utc>>> = HashMap::new();
        for sample in &batch.samples {
            present
                .entry(sample.source.clone())
                .or_default()
                .insert(sample.timestamp);
        }
        delivery.committed.retain(|source, keys| match present.get(source) {
            Some(now) => {
                keys.retain(|ts| now.contains(ts));
                !keys.is_empty()
            }
            None => false,
        });

        let total = batch.samples.len();
        let committed = &delivery.committed;
        batch.samples.retain(|sample| {
            committed
                .get(&sample.source)
                .map_or(true, |keys| !keys.contains(&sample.timestamp))
        });

        let mut pending: HashMap<String, HashSet<DateTime<Utc>>> = HashMap::new();
        for sample in &batch.samples {
            pending
                .entry(sample.source.clone())
                .or_default()
                .insert(sample.timestamp);
        }
        delivery.pending = pending;

        debug!(
            path = %self.path.display(),
            total,
            fresh = batch.samples.len(),
            rejected = batch.rejected.len(),
            "Read metrics batch"
        );
        Ok(batch)
    }

    async fn commit(&self, sources: &[String]) -> AdvisorResult<()> {
        let mut delivery = self
            .delivery
            .lock()
            .map_err(|_| AdvisorError::provider("delivery lock poisoned"))?;

        for source in sources {
            if let Some(keys) = delivery.pending.remove(source) {
                delivery.committed.entry(source.clone()).or_default().extend(keys);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

/// Serves queued batches in order, then empty batches
///
/// Queued failures surface as provider errors, which makes retry and
/// degraded-cycle paths easy to drive.
#[derive(Debug, Default)]
pub struct StaticProvider {
    queue: Mutex<VecDeque<Result<MetricsBatch, String>>>,
}

impl StaticProvider {
    pub fn new(batches: impl IntoIterator<Item = MetricsBatch>) -> Self {
        Self {
            queue: Mutex::new(batches.into_iter().map(Ok).collect()),
        }
    }

    pub fn push(&self, batch: MetricsBatch) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Ok(batch));
        }
    }

    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Err(message.into()));
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MetricsProvider for StaticProvider {
    async fn fetch_batch(&self) -> AdvisorResult<MetricsBatch> {
        let next = self
            .queue
            .lock()
            .map_err(|_| AdvisorError::provider("batch queue lock poisoned"))?
            .pop_front();

        match next {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(AdvisorError::provider(message)),
            None => Ok(MetricsBatch::default()),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}
