//! Keeper Janitor
//!
//! Orchestrates the lifecycle of a job's artifacts across its storages.
//!
//! # Overview
//!
//! The Janitor is responsible for:
//! - **Delivery**: fanning each artifact out to every storage, in parallel
//! - **Failure collection**: a failing storage never aborts its siblings
//! - **Rotation**: applying each storage's retention to full and
//!   incremental backups
//! - **Seeding**: reading incremental chain state back before an archiver
//!   run, with bounded retries for flaky backends
//! - **Metrics collection**: tracking deliveries, failures and deletions
//!
//! # Delivery Semantics
//!
//! | Outcome per artifact | Dump marked delivered | Reported as |
//! |----------------------|-----------------------|-------------|
//! | Every storage accepted | yes | success |
//! | Some storages failed | yes | warning |
//! | Every storage failed | no | [`JanitorError::Aggregate`] |
//! | No storage had an active tier | no | nothing |
//!
//! # Usage
//!
//! ```no_run
//! use keeper_domain::{ArtifactKey, RunDate};
//! use keeper_janitor::{Janitor, JanitorConfig};
//! use keeper_store::StorageSet;
//!
//! # async fn example(storages: StorageSet) -> Result<(), keeper_janitor::JanitorError> {
//! let mut janitor = Janitor::new(JanitorConfig::default());
//! let keys = vec![ArtifactKey::new("db/main").unwrap()];
//! let today = RunDate::from_ymd(2024, 3, 13).unwrap();
//!
//! let report = janitor.rotate_full(&storages, &keys, today, false).await?;
//! println!("Deleted: {}", report.total());
//! println!("\n{}", janitor.metrics().summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! seed_fetch_attempts = 3
//! seed_retry_backoff_ms = 500
//!
//! [backup_days]
//! weekly = "Sun"
//! monthly = 1
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod janitor;
mod metrics;
pub mod seed;

pub use config::JanitorConfig;
pub use error::{JanitorError, Operation, StorageFailure};
pub use janitor::Janitor;
pub use metrics::JanitorMetrics;
pub use seed::ChainRun;
