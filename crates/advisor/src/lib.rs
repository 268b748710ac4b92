//! Ingestion advisor daemon
//!
//! Runs recommendation cycles on a fixed interval and serves health,
//! metrics, the latest report and current baselines over HTTP.

pub mod api;
pub mod config;
