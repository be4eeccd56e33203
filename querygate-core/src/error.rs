//! Error types for querygate operations

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure reported by a query producer.
///
/// Captured into the entry's `error` field and surfaced through snapshots;
/// it is never returned to the caller that requested the query.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct ProducerFailure {
    message: String,
}

impl ProducerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Capture any displayable error as a producer failure.
    pub fn from_display(err: impl fmt::Display) -> Self {
        Self::new(err.to_string())
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cache store lock poisoned")]
    LockPoisoned,

    #[error("Observer channel closed for key {key}")]
    ObserverClosed { key: String },

    #[error("No async runtime available to fetch {key}")]
    NoRuntime { key: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all querygate errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for querygate operations.
pub type QueryResult<T> = Result<T, QueryError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_failure_display() {
        let failure = ProducerFailure::new("upstream timed out");
        assert_eq!(failure.to_string(), "upstream timed out");
        assert_eq!(failure.message(), "upstream timed out");
    }

    #[test]
    fn test_producer_failure_from_display() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let failure = ProducerFailure::from_display(io);
        assert!(failure.message().contains("disk gone"));
    }

    #[test]
    fn test_producer_failure_serializes_as_object() {
        let json = serde_json::to_string(&ProducerFailure::new("nope")).expect("serialize");
        assert_eq!(json, r#"{"message":"nope"}"#);
    }

    #[test]
    fn test_store_error_wraps_into_query_error() {
        let err: QueryError = StoreError::LockPoisoned.into();
        assert!(matches!(err, QueryError::Store(StoreError::LockPoisoned)));
        assert!(err.to_string().contains("lock poisoned"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "fetch_delay_ms".to_string(),
            value: "0".to_string(),
            reason: "must be > 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("fetch_delay_ms"));
        assert!(msg.contains("must be > 0"));
    }
}
