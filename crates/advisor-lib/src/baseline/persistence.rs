//! Durable baseline state
//!
//! The persisted layout is a JSON object mapping source to baseline. A
//! missing file means cold start; a file that exists but cannot be parsed is
//! an error, so a corrupt state file is never silently replaced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{AdvisorError, AdvisorResult};
use crate::models::Baseline;

/// Storage backend for the baseline map
#[async_trait]
pub trait BaselinePersistence: Send + Sync {
    /// Read the full map; absent state yields an empty map
    async fn load(&self) -> AdvisorResult<BTreeMap<String, Baseline>>;

    /// Replace the stored map with `baselines`
    async fn save(&self, baselines: &BTreeMap<String, Baseline>) -> AdvisorResult<()>;
}

/// JSON file persistence with atomic replace
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BaselinePersistence for JsonFileStore {
    async fn load(&self) -> AdvisorResult<BTreeMap<String, Baseline>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No baseline state found, cold start");
                return Ok(BTreeMap::new());
            }
            Err(e) => {
                return Err(AdvisorError::persistence(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_slice(&data).map_err(|e| {
            AdvisorError::persistence(format!(
                "failed to parse baseline state {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn save(&self, baselines: &BTreeMap<String, Baseline>) -> AdvisorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AdvisorError::persistence(format!(
                        "failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let json = serde_json::to_vec_pretty(baselines)?;

        let temp_path = self.path.with_extension("tmp");
        let write = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, &self.path).await
        };
        write.await.map_err(|e: std::io::Error| {
            AdvisorError::persistence(format!(
                "failed to write {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(path = %self.path.display(), sources = baselines.len(), "Baseline state written");
        Ok(())
    }
}

/// In-process persistence for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: Mutex<BTreeMap<String, Baseline>>,
}

impl MemoryPersistence {
    pub fn with_state(state: BTreeMap<String, Baseline>) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl BaselinePersistence for MemoryPersistence {
    async fn load(&self) -> AdvisorResult<BTreeMap<String, Baseline>> {
        self.state
            .lock()
            .map(|state| state.clone())
            .map_err(|_| AdvisorError::persistence("memory state lock poisoned"))
    }

    async fn save(&self, baselines: &BTreeMap<String, Baseline>) -> AdvisorResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AdvisorError::persistence("memory state lock poisoned"))?;
        *state = baselines.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn baseline(source: &str, count: u64) -> Baseline {
        Baseline {
            source: source.to_string(),
            avg_volume: 1024.0 * count as f64,
            avg_latency: 0.75,
            sample_count: count,
            last_updated: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_cold_start() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("baselines.json"));

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("baselines.json");
        let store = JsonFileStore::new(&path);

        let mut map = BTreeMap::new();
        map.insert("SecurityEvent".to_string(), baseline("SecurityEvent", 3));
        map.insert("Syslog".to_string(), baseline("Syslog", 7));
        store.save(&map).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, map);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("baselines.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = JsonFileStore::new(&path).load().await;
        assert!(matches!(result, Err(AdvisorError::Persistence { .. })));
    }

    #[tokio::test]
    async fn test_memory_persistence_replaces_state() {
        let persistence = MemoryPersistence::default();
        let mut map = BTreeMap::new();
        map.insert("A".to_string(), baseline("A", 1));
        persistence.save(&map).await.unwrap();

        map.insert("B".to_string(), baseline("B", 2));
        persistence.save(&map).await.unwrap();

        assert_eq!(persistence.load().await.unwrap().len(), 2);
    }
}
