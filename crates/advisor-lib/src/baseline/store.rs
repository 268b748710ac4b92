//! In-memory baseline store
//!
//! Owns the only mutable shared state of the engine. Each source's entry is
//! updated under its map shard lock, so writers to the same source are
//! serialized while distinct sources proceed in parallel.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::BaselinePersistence;
use crate::error::AdvisorResult;
use crate::models::{Baseline, MeasurementSample};

impl Baseline {
    fn from_first_sample(sample: &MeasurementSample) -> Self {
        Self {
            source: sample.source.clone(),
            avg_volume: sample.volume_bytes as f64,
            avg_latency: sample.latency_seconds,
            sample_count: 1,
            last_updated: sample.timestamp,
        }
    }

    fn fold(&mut self, sample: &MeasurementSample) {
        let n = self.sample_count as f64;
        self.avg_volume = (self.avg_volume * n + sample.volume_bytes as f64) / (n + 1.0);
        self.avg_latency = (self.avg_latency * n + sample.latency_seconds) / (n + 1.0);
        self.sample_count += 1;
        self.last_updated = sample.timestamp;
    }
}

/// Rolling baselines keyed by source
pub struct BaselineStore {
    baselines: DashMap<String, Baseline>,
    persistence: Arc<dyn BaselinePersistence>,
}

impl BaselineStore {
    /// Empty store backed by the given persistence
    pub fn new(persistence: Arc<dyn BaselinePersistence>) -> Self {
        Self {
            baselines: DashMap::new(),
            persistence,
        }
    }

    /// Reconstruct prior state; an absent store is a cold start
    pub async fn load(persistence: Arc<dyn BaselinePersistence>) -> AdvisorResult<Self> {
        let loaded = persistence.load().await?;
        let store = Self::new(persistence);
        for (source, baseline) in loaded {
            store.baselines.insert(source, baseline);
        }
        info!(sources = store.len(), "Loaded baselines");
        Ok(store)
    }

    /// Fold one sample into its source's baseline and return the result
    pub fn update(&self, source: &str, sample: &MeasurementSample) -> Baseline {
        let entry = self
            .baselines
            .entry(source.to_string())
            .and_modify(|baseline| baseline.fold(sample))
            .or_insert_with(|| {
                debug!(source = %source, "First sample for source, creating baseline");
                let mut baseline = Baseline::from_first_sample(sample);
                baseline.source = source.to_string();
                baseline
            });
        entry.value().clone()
    }

    pub fn get(&self, source: &str) -> Option<Baseline> {
        self.baselines.get(source).map(|entry| entry.value().clone())
    }

    /// All baselines ordered by source
    pub fn snapshot(&self) -> BTreeMap<String, Baseline> {
        self.baselines
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Persist the entire map, including sources not seen this cycle
    pub async fn save(&self) -> AdvisorResult<()> {
        let snapshot = self.snapshot();
        self.persistence.save(&snapshot).await?;
        debug!(sources = snapshot.len(), "Baselines saved");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryPersistence;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn sample(source: &str, minute: i64, volume: u64, latency: f64) -> MeasurementSample {
        MeasurementSample::new(source, start() + Duration::minutes(minute), volume, latency, 1)
            .unwrap()
    }

    fn store() -> BaselineStore {
        BaselineStore::new(Arc::new(MemoryPersistence::default()))
    }

    #[test]
    fn test_first_sample_initializes_baseline() {
        let store = store();
        let baseline = store.update("Syslog", &sample("Syslog", 0, 400, 2.0));

        assert_eq!(baseline.sample_count, 1);
        assert_eq!(baseline.avg_volume, 400.0);
        assert_eq!(baseline.avg_latency, 2.0);
        assert_eq!(baseline.last_updated, start());
    }

    #[test]
    fn test_incremental_mean() {
        let store = store();
        let volumes = [100u64, 250, 75, 1000, 3];
        let latencies = [0.5, 1.5, 0.25, 4.0, 0.0];

        for (i, (v, l)) in volumes.iter().zip(latencies.iter()).enumerate() {
            let before = store.get("Syslog");
            let after = store.update("Syslog", &sample("Syslog", i as i64, *v, *l));

            let n = before.as_ref().map(|b| b.sample_count).unwrap_or(0);
            assert_eq!(after.sample_count, n + 1);
            if let Some(b) = before {
                let expected = (b.avg_volume * n as f64 + *v as f64) / (n as f64 + 1.0);
                assert!((after.avg_volume - expected).abs() < 1e-9);
                let expected = (b.avg_latency * n as f64 + *l) / (n as f64 + 1.0);
                assert!((after.avg_latency - expected).abs() < 1e-9);
            }
        }

        let final_baseline = store.get("Syslog").unwrap();
        let mean = volumes.iter().sum::<u64>() as f64 / volumes.len() as f64;
        assert!((final_baseline.avg_volume - mean).abs() < 1e-9);
        assert_eq!(final_baseline.last_updated, start() + Duration::minutes(4));
    }

    #[test]
    fn test_sources_are_independent() {
        let store = store();
        store.update("A", &sample("A", 0, 10, 1.0));
        store.update("B", &sample("B", 0, 90, 3.0));
        store.update("A", &sample("A", 1, 30, 1.0));

        assert_eq!(store.get("A").unwrap().avg_volume, 20.0);
        assert_eq!(store.get("B").unwrap().avg_volume, 90.0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_save_keeps_sources_absent_this_cycle() {
        let persistence = Arc::new(MemoryPersistence::default());
        let store = BaselineStore::new(persistence.clone());
        store.update("A", &sample("A", 0, 10, 1.0));
        store.update("B", &sample("B", 0, 20, 1.0));
        store.save().await.unwrap();

        let reloaded = BaselineStore::load(persistence.clone()).await.unwrap();
        reloaded.update("A", &sample("A", 5, 30, 1.0));
        reloaded.save().await.unwrap();

        let saved = persistence.load().await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved["A"].sample_count, 2);
        assert_eq!(saved["B"].sample_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_one_source_are_serialized() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update("Busy", &sample("Busy", i, 100, 1.0));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let baseline = store.get("Busy").unwrap();
        assert_eq!(baseline.sample_count, 32);
        assert!((baseline.avg_volume - 100.0).abs() < 1e-9);
    }
}
