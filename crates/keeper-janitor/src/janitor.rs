//! Core Janitor implementation: delivery fan-out and rotation

use crate::error::{Operation, StorageFailure};
use crate::seed::ChainRun;
use crate::{JanitorConfig, JanitorError, JanitorMetrics};
use keeper_domain::chain::incremental_placement;
use keeper_domain::placement::full_placement;
use keeper_domain::{
    ArtifactKey, BackupDays, DumpSet, RotationReport, RotationRequest, RunDate, Storage,
    StorageError,
};
use keeper_store::StorageSet;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Result of one storage operation; `None` when the storage had nothing to do
type Outcome<T> = Option<Result<T, StorageError>>;

/// Janitor service delivering artifacts to a job's storages and rotating
/// them
///
/// Responsible for:
/// - Fanning each artifact out to every storage in parallel
/// - Collecting per-storage failures without aborting siblings
/// - Marking an artifact delivered once any storage accepted it
/// - Running retention rotations and collecting their deletions
///
/// # Examples
///
/// ```no_run
/// use keeper_domain::{ArtifactKey, DumpObject, DumpSet, RunDate};
/// use keeper_janitor::Janitor;
/// use keeper_store::StorageSet;
///
/// # async fn example(storages: StorageSet) -> Result<(), keeper_janitor::JanitorError> {
/// let mut janitor = Janitor::default_config();
/// let mut dumps = DumpSet::new();
/// dumps.insert(
///     ArtifactKey::new("www/var_www").unwrap(),
///     DumpObject::new("/tmp/keeper/var_www.tar.gz".into()),
/// );
///
/// let today = RunDate::from_ymd(2024, 3, 13).unwrap();
/// janitor.deliver_full(&storages, &mut dumps, today).await?;
/// println!("{}", janitor.metrics().summary());
/// # Ok(())
/// # }
/// ```
pub struct Janitor {
    pub(crate) config: JanitorConfig,
    pub(crate) metrics: JanitorMetrics,
}

impl Janitor {
    /// Create a new Janitor with the given configuration
    pub fn new(config: JanitorConfig) -> Self {
        Self {
            config,
            metrics: JanitorMetrics::new(),
        }
    }

    /// Create a Janitor with default configuration
    pub fn default_config() -> Self {
        Self::new(JanitorConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Get a reference to the current metrics
    pub fn metrics(&self) -> &JanitorMetrics {
        &self.metrics
    }

    /// Mutable access to the metrics, for runtime accounting by the caller
    pub fn metrics_mut(&mut self) -> &mut JanitorMetrics {
        &mut self.metrics
    }

    /// Deliver every undelivered full-backup dump
    ///
    /// Each storage places the artifact on its own active tiers; a storage
    /// with no active tier today is skipped. Failures only surface when no
    /// storage accepted an artifact.
    pub async fn deliver_full(
        &mut self,
        storages: &StorageSet,
        dumps: &mut DumpSet,
        date: RunDate,
    ) -> Result<(), JanitorError> {
        let days = self.config.backup_days;
        let mut failures = Vec::new();

        for (key, temp_file) in pending(dumps) {
            let op_key = key.clone();
            let file = temp_file.clone();
            let outcomes = fan_out(storages, move |storage| {
                deliver_full_one(storage, &file, &op_key, &date, &days)
            })
            .await?;

            if self.settle(&key, outcomes, &mut failures) {
                dumps.mark_delivered(&key);
            }
        }

        aggregate(failures)
    }

    /// Deliver every undelivered incremental dump together with its mutated
    /// snapshot
    ///
    /// Dumps without a prepared chain are left undelivered.
    pub async fn deliver_incremental(
        &mut self,
        storages: &StorageSet,
        dumps: &mut DumpSet,
        chains: &BTreeMap<ArtifactKey, ChainRun>,
        date: RunDate,
    ) -> Result<(), JanitorError> {
        let mut failures = Vec::new();

        for (key, temp_file) in pending(dumps) {
            let Some(chain) = chains.get(&key) else {
                tracing::warn!("No chain prepared for {}, skipping delivery", key);
                self.metrics.record_artifact(false);
                continue;
            };
            let init = chain.is_init();
            let snapshot = chain.snapshot.clone();
            let op_key = key.clone();
            let file = temp_file.clone();
            let outcomes = fan_out(storages, move |storage| {
                deliver_chain_one(storage, &file, &snapshot, &op_key, &date, init)
            })
            .await?;

            if self.settle(&key, outcomes, &mut failures) {
                dumps.mark_delivered(&key);
            }
        }

        aggregate(failures)
    }

    /// Rotate full backups of the given keys on every storage
    pub async fn rotate_full(
        &mut self,
        storages: &StorageSet,
        keys: &[ArtifactKey],
        date: RunDate,
        safety: bool,
    ) -> Result<RotationReport, JanitorError> {
        let days = self.config.backup_days;
        let keys = Arc::new(keys.to_vec());
        self.rotate(storages, move |storage| {
            Some(storage.rotate(&RotationRequest::Full {
                keys: keys.as_slice(),
                date,
                days,
                safety,
            }))
        })
        .await
    }

    /// Rotate incremental chains of the given keys on every storage
    ///
    /// With `full`, each key's whole chain is deleted.
    pub async fn rotate_incremental(
        &mut self,
        storages: &StorageSet,
        keys: &[ArtifactKey],
        date: RunDate,
        full: bool,
    ) -> Result<RotationReport, JanitorError> {
        let keys = Arc::new(keys.to_vec());
        self.rotate(storages, move |storage| {
            Some(storage.rotate(&RotationRequest::Incremental {
                keys: keys.as_slice(),
                date,
                full,
            }))
        })
        .await
    }

    async fn rotate<F>(&mut self, storages: &StorageSet, op: F) -> Result<RotationReport, JanitorError>
    where
        F: Fn(&dyn Storage) -> Outcome<RotationReport> + Send + Sync + 'static,
    {
        let mut report = RotationReport::new();
        let mut failures = Vec::new();

        for (storage, outcome) in fan_out(storages, op).await? {
            match outcome {
                Some(Ok(storage_report)) => {
                    if storage_report.total() > 0 {
                        tracing::info!(
                            "Rotated '{}': {} items deleted",
                            storage,
                            storage_report.total()
                        );
                    }
                    report.merge(&storage_report);
                }
                Some(Err(error)) => {
                    tracing::error!("Rotation on '{}' failed: {}", storage, error);
                    self.metrics.record_failure(&storage);
                    failures.push(StorageFailure {
                        storage,
                        key: None,
                        operation: Operation::Rotate,
                        error,
                    });
                }
                None => {}
            }
        }

        self.metrics.record_rotation(&report);
        aggregate(failures)?;
        Ok(report)
    }

    /// Fold the outcomes of one artifact; returns whether any storage
    /// accepted it
    fn settle(
        &mut self,
        key: &ArtifactKey,
        outcomes: Vec<(String, Outcome<()>)>,
        failures: &mut Vec<StorageFailure>,
    ) -> bool {
        let mut accepted = 0;
        let mut key_failures = Vec::new();

        for (storage, outcome) in outcomes {
            match outcome {
                Some(Ok(())) => {
                    tracing::info!("Delivered {} to '{}'", key, storage);
                    self.metrics.record_delivery(&storage);
                    accepted += 1;
                }
                Some(Err(error)) => {
                    tracing::error!("Delivery of {} to '{}' failed: {}", key, storage, error);
                    self.metrics.record_failure(&storage);
                    key_failures.push(StorageFailure {
                        storage,
                        key: Some(key.clone()),
                        operation: Operation::Deliver,
                        error,
                    });
                }
                None => {
                    tracing::debug!("'{}' has no active tier for {} today", storage, key);
                }
            }
        }

        let delivered = accepted > 0;
        self.metrics.record_artifact(delivered);

        if delivered {
            if !key_failures.is_empty() {
                tracing::warn!(
                    "{} delivered to {} storage(s), {} failed",
                    key,
                    accepted,
                    key_failures.len()
                );
            }
        } else if !key_failures.is_empty() {
            tracing::error!("{} could not be delivered to any storage", key);
            failures.extend(key_failures);
        }

        delivered
    }
}

/// Keys and temp files of dumps still awaiting delivery
fn pending(dumps: &DumpSet) -> Vec<(ArtifactKey, PathBuf)> {
    dumps
        .iter()
        .filter(|(_, dump)| !dump.delivered)
        .map(|(key, dump)| (key.clone(), dump.temp_file.clone()))
        .collect()
}

fn aggregate(failures: Vec<StorageFailure>) -> Result<(), JanitorError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(JanitorError::Aggregate(failures))
    }
}

/// Run one blocking operation per storage concurrently, collecting every
/// outcome by storage name
async fn fan_out<T, F>(storages: &StorageSet, op: F) -> Result<Vec<(String, Outcome<T>)>, JanitorError>
where
    T: Send + 'static,
    F: Fn(&dyn Storage) -> Outcome<T> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let mut tasks = JoinSet::new();

    for storage in storages.iter() {
        let storage = Arc::clone(storage);
        let op = Arc::clone(&op);
        tasks.spawn_blocking(move || {
            let outcome = op(storage.as_ref());
            (storage.name().to_string(), outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(storages.len());
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined.map_err(|e| JanitorError::Worker(e.to_string()))?);
    }
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(outcomes)
}

fn deliver_full_one(
    storage: &dyn Storage,
    file: &Path,
    key: &ArtifactKey,
    date: &RunDate,
    days: &BackupDays,
) -> Outcome<()> {
    let placement = full_placement(file, key, storage.backup_root(), storage.retention(), date, days)?;
    tracing::debug!(
        "{} on '{}': primary {:?}, {} link(s)",
        key,
        storage.name(),
        placement.primary(),
        placement.links.len()
    );
    Some(storage.deliver(file, &placement))
}

fn deliver_chain_one(
    storage: &dyn Storage,
    file: &Path,
    snapshot: &Path,
    key: &ArtifactKey,
    date: &RunDate,
    init: bool,
) -> Outcome<()> {
    let placement = incremental_placement(file, key, storage.backup_root(), date, init)?;
    let result = storage.deliver(file, &placement.artifact).and_then(|()| {
        match &placement.snapshot {
            Some(snapshot_placement) => storage.deliver(snapshot, snapshot_placement),
            None => Ok(()),
        }
    });
    Some(result)
}
