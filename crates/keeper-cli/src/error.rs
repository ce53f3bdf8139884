//! Error types for the CLI application.

use keeper_janitor::JanitorError;
use keeper_store::StoreError;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage could not be opened
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Delivery, rotation or seeding error
    #[error("Janitor error: {0}")]
    Janitor(#[from] JanitorError),

    /// Archiver failure
    #[error("Archive error: {0}")]
    Archive(String),

    /// Another invocation holds the run lock
    #[error("Lock error: {0}")]
    Lock(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// One or more jobs finished with errors
    #[error("{0} job(s) finished with errors")]
    JobsFailed(usize),
}
