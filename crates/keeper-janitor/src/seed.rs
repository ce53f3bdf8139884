//! Seed preparation for incremental runs
//!
//! Before the archiver runs, the chain's state is read back from the job's
//! storages: `year.inc` decides whether the chain continues, then the seed
//! the calendar asks for is copied into the run's working snapshot.

use crate::{Janitor, JanitorError};
use keeper_domain::chain::{init_marker_path, meta_rel_path, plan_seed};
use keeper_domain::{ArtifactKey, IncTier, RunDate, Seed, SeedPlan, StorageError};
use keeper_store::{SetRead, StorageSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result of a snapshot lookup across a storage set
#[derive(Debug)]
pub enum Fetch {
    /// Read from a storage
    Found(SetRead),

    /// Missing on every storage
    Missing,

    /// Backends kept failing after every attempt
    Failed(StorageError),
}

/// Incremental run of one key, ready for the archiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRun {
    /// Seed decision for the run
    pub plan: SeedPlan,

    /// Temp file the archiver writes the artifact to
    pub artifact: PathBuf,

    /// Working snapshot the archiver mutates
    pub snapshot: PathBuf,
}

impl ChainRun {
    /// Whether the run starts a new chain
    ///
    /// True when the plan says so or the temp-side `.init` marker exists.
    pub fn is_init(&self) -> bool {
        self.plan.init || init_marker_path(&self.artifact).exists()
    }
}

/// Read a snapshot, retrying backend failures
///
/// A file missing on every storage is reported at once; other errors are
/// retried up to `attempts` times with a linear backoff.
pub async fn fetch_with_retry(
    storages: &StorageSet,
    rel_path: &Path,
    attempts: u32,
    backoff: Duration,
) -> Result<Fetch, JanitorError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        let set = storages.clone();
        let path = rel_path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || set.read_first(&path))
            .await
            .map_err(|e| JanitorError::Worker(e.to_string()))?;

        match result {
            Ok(read) => return Ok(Fetch::Found(read)),
            Err(e) if e.is_not_found() => return Ok(Fetch::Missing),
            Err(e) if attempt >= attempts => return Ok(Fetch::Failed(e)),
            Err(e) => {
                tracing::warn!(
                    "Reading {} failed (attempt {}/{}): {}",
                    rel_path.display(),
                    attempt,
                    attempts,
                    e
                );
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> JanitorError + '_ {
    move |source| JanitorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_if_exists(path: &Path) -> Result<(), JanitorError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path)(e)),
    }
}

impl Janitor {
    /// Prepare the incremental run of one key
    ///
    /// Looks up `year.inc` (with retries), decides the seed, and either
    /// marks the run as a chain reinitialization or copies the required
    /// seed into `snapshot`. A missing `year.inc` never fails the run; a
    /// missing month or decade seed does.
    pub async fn prepare_chain(
        &mut self,
        storages: &StorageSet,
        key: &ArtifactKey,
        date: &RunDate,
        artifact: &Path,
        snapshot: &Path,
    ) -> Result<ChainRun, JanitorError> {
        let attempts = self.config.seed_fetch_attempts;
        let backoff = self.config.seed_retry_backoff();

        let year_rel = meta_rel_path(key, date.year(), IncTier::Year);
        let year = match fetch_with_retry(storages, &year_rel, attempts, backoff).await? {
            Fetch::Found(read) => {
                tracing::debug!("{} served {}", read.storage, year_rel.display());
                Some(read.data)
            }
            Fetch::Missing => {
                if !date.is_year_boundary() {
                    tracing::warn!("No year.inc for {} on any storage, starting a new chain", key);
                }
                None
            }
            Fetch::Failed(e) => {
                tracing::warn!(
                    "year.inc for {} unreadable after {} attempt(s), starting a new chain: {}",
                    key,
                    attempts,
                    e
                );
                None
            }
        };

        let plan = plan_seed(date, year.is_some());
        let marker = init_marker_path(artifact);

        if plan.init {
            remove_if_exists(snapshot)?;
            fs::write(&marker, b"").map_err(io_error(&marker))?;
            self.metrics.record_reinit();
            tracing::info!("Chain for {} starts a new baseline", key);
        } else {
            remove_if_exists(&marker)?;
            let data = match (plan.seed, year) {
                (Seed::Stored(IncTier::Year), Some(data)) => data,
                (Seed::Stored(tier), _) => {
                    self.fetch_required(storages, key, date, tier, attempts, backoff)
                        .await?
                }
                (Seed::Fresh, _) => Vec::new(),
            };
            fs::write(snapshot, data).map_err(io_error(snapshot))?;
            tracing::debug!("Seeded {} from {:?}", key, plan.seed);
        }

        Ok(ChainRun {
            plan,
            artifact: artifact.to_path_buf(),
            snapshot: snapshot.to_path_buf(),
        })
    }

    async fn fetch_required(
        &self,
        storages: &StorageSet,
        key: &ArtifactKey,
        date: &RunDate,
        tier: IncTier,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Vec<u8>, JanitorError> {
        let rel = meta_rel_path(key, date.year(), tier);
        match fetch_with_retry(storages, &rel, attempts, backoff).await? {
            Fetch::Found(read) => Ok(read.data),
            Fetch::Missing => Err(JanitorError::SeedUnavailable {
                key: key.clone(),
                tier,
                source: StorageError::NotFound(rel),
            }),
            Fetch::Failed(source) => Err(JanitorError::SeedUnavailable {
                key: key.clone(),
                tier,
                source,
            }),
        }
    }
}
