//! Per-source baselines
//!
//! This module provides:
//! - The in-memory baseline store and its incremental mean update
//! - Durable persistence of the full `source -> Baseline` map

mod persistence;
mod store;

pub use persistence::{BaselinePersistence, JsonFileStore, MemoryPersistence};
pub use store::BaselineStore;
