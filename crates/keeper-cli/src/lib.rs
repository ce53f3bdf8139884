//! Keeper CLI library.
//!
//! This library provides the application layer of keeper: configuration
//! loading, the job runner that sequences archiving, delivery and rotation,
//! the tar archiver, the run lock, and output formatting.

pub mod archiver;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod lock;
pub mod output;
pub mod runner;

pub use archiver::{ArchiveError, TarArchiver};
pub use cli::{Cli, Command};
pub use config::KeeperConfig;
pub use error::{CliError, Result};
pub use lock::RunLock;
pub use output::Formatter;
pub use runner::{JobReport, JobRunner};
