//! Error types for Janitor operations

use keeper_domain::{ArtifactKey, IncTier, StorageError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Storage operation a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Artifact delivery
    Deliver,

    /// Retention rotation
    Rotate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Deliver => f.write_str("delivery"),
            Operation::Rotate => f.write_str("rotation"),
        }
    }
}

/// One failed operation on one storage
#[derive(Error, Debug)]
#[error("{operation}{} on '{storage}' failed: {error}", key_suffix(.key))]
pub struct StorageFailure {
    /// Storage name
    pub storage: String,

    /// Artifact the operation was for, if any
    pub key: Option<ArtifactKey>,

    /// Failed operation
    pub operation: Operation,

    /// Error reported by the storage
    pub error: StorageError,
}

fn key_suffix(key: &Option<ArtifactKey>) -> String {
    key.as_ref().map(|k| format!(" of {}", k)).unwrap_or_default()
}

/// Errors that can occur during Janitor operations
#[derive(Error, Debug)]
pub enum JanitorError {
    /// A seed the run cannot proceed without is unavailable
    #[error("Required {tier}.inc seed for {key} unavailable: {source}")]
    SeedUnavailable {
        /// Artifact key
        key: ArtifactKey,
        /// Seed tier
        tier: IncTier,
        /// Last lookup error
        #[source]
        source: StorageError,
    },

    /// Local I/O error on the run's temp files
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path of the temp file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failures collected across storages
    #[error("{} storage operation(s) failed", .0.len())]
    Aggregate(Vec<StorageFailure>),

    /// Worker error (tokio runtime issues)
    #[error("Worker error: {0}")]
    Worker(String),
}

impl JanitorError {
    /// Failures carried by an aggregate error
    pub fn failures(&self) -> &[StorageFailure] {
        match self {
            JanitorError::Aggregate(failures) => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        let failure = StorageFailure {
            storage: "s3".to_string(),
            key: Some(ArtifactKey::new("www/html").unwrap()),
            operation: Operation::Deliver,
            error: StorageError::Backend("timeout".to_string()),
        };
        assert_eq!(
            failure.to_string(),
            "delivery of www/html on 's3' failed: Backend error: timeout"
        );

        let failure = StorageFailure {
            storage: "disk".to_string(),
            key: None,
            operation: Operation::Rotate,
            error: StorageError::Backend("denied".to_string()),
        };
        assert_eq!(failure.to_string(), "rotation on 'disk' failed: Backend error: denied");
    }

    #[test]
    fn test_aggregate_display() {
        let err = JanitorError::Aggregate(vec![StorageFailure {
            storage: "s3".to_string(),
            key: None,
            operation: Operation::Rotate,
            error: StorageError::Backend("x".to_string()),
        }]);
        assert_eq!(err.to_string(), "1 storage operation(s) failed");
        assert_eq!(err.failures().len(), 1);
        assert!(JanitorError::Worker("x".to_string()).failures().is_empty());
    }
}
