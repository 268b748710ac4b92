//! Subcommand implementations

pub mod analyze;
pub mod baselines;
pub mod report;
pub mod savings;
