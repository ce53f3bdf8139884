//! Keeper Domain Layer
//!
//! This crate contains the backup-artifact lifecycle model for Keeper: the
//! retention rules, the calendar-driven tier decisions and the placement
//! algorithms that decide where an artifact lands on a storage. It performs
//! no I/O of its own; storages and archivers are reached through the trait
//! definitions in [`traits`].
//!
//! ## Key Concepts
//!
//! - **RetentionPolicy**: day/week/month counts, in count or date mode
//! - **Tier**: Daily/Weekly/Monthly for full backups
//! - **Chain**: Year/Month/Decade-day placement and seed selection for
//!   incremental backups
//! - **Placement**: one primary destination plus links for every other
//!   active tier (dedup-by-link)
//! - **ArtifactKey**: the storage-relative prefix of one source/target pair
//!
//! ## Architecture
//!
//! - Pure functions over a [`RunDate`] captured once per run
//! - Infrastructure implementations live in other crates
//! - Trait definitions for all external interactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod calendar;
pub mod chain;
pub mod placement;
pub mod retention;
pub mod rotation;
pub mod traits;

// Re-exports for convenience
pub use artifact::{ArtifactKey, DumpObject, DumpSet, RunId};
pub use calendar::{BackupDays, Clock, FixedClock, RunDate, SystemClock};
pub use chain::{ChainState, IncTier, Seed, SeedPlan};
pub use placement::Placement;
pub use retention::{Cutoff, RetentionPolicy, Tier};
pub use rotation::{FileEntry, RotationReport, RotationRequest};
pub use traits::{ArchiveRequest, Archiver, Storage, StorageError, StorageRank};
