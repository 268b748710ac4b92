//! Error types for the ingestion advisor

use thiserror::Error;

use crate::models::Tier;

/// Errors produced by the advisor engine and its collaborators
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// A measurement sample failed validation
    #[error("Invalid sample for source '{source_id}': {reason}")]
    InvalidSample { source_id: String, reason: String },

    /// A tier has no entry in the rate table
    #[error("Unknown tier '{tier}': no rate configured")]
    UnknownTier { tier: Tier },

    /// A classification input required by the selected strategy is missing
    #[error("Missing usage profile field '{field}' for source '{source_id}'")]
    MissingProfile { source_id: String, field: &'static str },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Metrics provider failure
    #[error("Metrics provider error: {message}")]
    Provider { message: String },

    /// Baseline persistence failure
    #[error("Baseline persistence error: {message}")]
    Persistence { message: String },

    /// A blocking operation exceeded its timeout
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl AdvisorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn invalid_sample(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

/// Advisor result type
pub type AdvisorResult<T> = Result<T, AdvisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tier_message() {
        let error = AdvisorError::UnknownTier { tier: Tier::Archive };
        assert_eq!(
            error.to_string(),
            "Unknown tier 'archive': no rate configured"
        );
    }

    #[test]
    fn test_invalid_sample_message() {
        let error = AdvisorError::invalid_sample("SecurityEvent", "latency is NaN");
        assert_eq!(
            error.to_string(),
            "Invalid sample for source 'SecurityEvent': latency is NaN"
        );
    }

    #[test]
    fn test_timeout_message() {
        let error = AdvisorError::Timeout {
            operation: "fetch_batch".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(error.to_string(), "fetch_batch timed out after 250ms");
    }

    #[test]
    fn test_io_error_conversion() {
        fn may_fail() -> AdvisorResult<()> {
            let io_result: Result<(), std::io::Error> = Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "state file locked",
            ));
            io_result?;
            Ok(())
        }

        match may_fail().unwrap_err() {
            AdvisorError::Io { source } => assert!(source.to_string().contains("locked")),
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AdvisorError>();
        assert_sync::<AdvisorError>();
    }
}
