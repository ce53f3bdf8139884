//! Job runner
//!
//! Runs configured jobs one after another. For each job it:
//!
//! 1. Derives job-scoped handles of the job's storages
//! 2. Skips full jobs no storage would accept an artifact from today
//! 3. Creates the run's temp directory
//! 4. Rotates before archiving (unless the job runs in safety mode)
//! 5. Prepares incremental chains and archives every target
//! 6. Delivers the artifacts
//! 7. Rotates after delivery (safety mode only)
//! 8. Removes the temp directory, whatever happened before
//!
//! Errors are collected into the job's [`JobReport`]; one failing target
//! never stops its siblings.

use crate::config::{JobConfig, JobKind, KeeperConfig, SourceConfig};
use crate::error::{CliError, Result};
use keeper_domain::retention::job_needs_full_backup_today;
use keeper_domain::{
    ArchiveRequest, Archiver, ArtifactKey, Clock, DumpObject, DumpSet, RunDate, RunId, Storage,
};
use keeper_janitor::{ChainRun, Janitor, JanitorError};
use keeper_store::{open_storage, StorageSet};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Run timestamp embedded in artifact names
const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// Outcome of one job run
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    /// Job name
    pub job: String,

    /// Job kind
    pub kind: JobKind,

    /// Run date
    pub date: String,

    /// Whether the job had nothing to do today
    pub skipped: bool,

    /// Artifacts produced
    pub artifacts: usize,

    /// Artifacts accepted by at least one storage
    pub delivered: usize,

    /// Failed operations per storage
    pub failed: BTreeMap<String, usize>,

    /// Items deleted per tier
    pub deleted: BTreeMap<String, usize>,

    /// Incremental chains started from scratch
    pub reinits: usize,

    /// Errors collected during the run
    pub errors: Vec<String>,

    /// Wall-clock duration in seconds
    pub runtime_secs: u64,
}

impl JobReport {
    fn new(job: &JobConfig, date: RunDate) -> Self {
        Self {
            job: job.name.clone(),
            kind: job.kind,
            date: date.to_string(),
            skipped: false,
            artifacts: 0,
            delivered: 0,
            failed: BTreeMap::new(),
            deleted: BTreeMap::new(),
            reinits: 0,
            errors: Vec::new(),
            runtime_secs: 0,
        }
    }

    /// Whether the run finished without errors
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn push_error(&mut self, error: impl std::fmt::Display) {
        let message = error.to_string();
        tracing::error!("{}", message);
        self.errors.push(message);
    }

    fn push_janitor_error(&mut self, error: JanitorError) {
        let failures = error.failures();
        if failures.is_empty() {
            self.push_error(&error);
            return;
        }
        let messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
        for message in messages {
            self.push_error(message);
        }
    }
}

/// One archiver run of a job
struct Target<'a> {
    key: ArtifactKey,
    source: &'a SourceConfig,
    path: &'a Path,
}

/// Sequential runner of configured jobs
pub struct JobRunner<A, C> {
    config: KeeperConfig,
    archiver: A,
    clock: C,
    opened: BTreeMap<String, Arc<dyn Storage>>,
}

impl<A, C> JobRunner<A, C>
where
    A: Archiver + Clone + 'static,
    C: Clock,
{
    /// Create a runner over a validated configuration
    pub fn new(config: KeeperConfig, archiver: A, clock: C) -> Self {
        Self {
            config,
            archiver,
            clock,
            opened: BTreeMap::new(),
        }
    }

    /// Use an already opened storage for a configured storage name
    ///
    /// Storages not registered here are opened from the configuration on
    /// first use.
    pub fn with_storage(mut self, name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        self.opened.insert(name.into(), storage);
        self
    }

    /// The runner's configuration
    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    /// Run the named jobs, or every job when `names` is empty
    ///
    /// # Errors
    /// Returns error if a name matches no configured job
    pub async fn run(&mut self, names: &[String]) -> Result<Vec<JobReport>> {
        let jobs: Vec<JobConfig> = if names.is_empty() {
            self.config.jobs.clone()
        } else {
            names
                .iter()
                .map(|name| {
                    self.config
                        .job(name)
                        .cloned()
                        .ok_or_else(|| CliError::InvalidInput(format!("Unknown job '{}'", name)))
                })
                .collect::<Result<_>>()?
        };

        let mut reports = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let span = tracing::info_span!("job", name = %job.name);
            reports.push(self.run_job(job).instrument(span).await);
        }
        Ok(reports)
    }

    /// Run a single job
    pub async fn run_job(&mut self, job: &JobConfig) -> JobReport {
        let started = Instant::now();
        let now = self.clock.now();
        let date = RunDate::new(now.date());
        let stamp = now.format(STAMP_FORMAT).to_string();
        let mut report = JobReport::new(job, date);
        tracing::info!("Starting {} job '{}' for {}", job.kind, job.name, date);

        let storages = match self.storage_set(job) {
            Ok(storages) => storages,
            Err(e) => {
                report.push_error(e);
                return report;
            }
        };

        let days = self.config.backup_days();
        if job.kind == JobKind::Files
            && !job_needs_full_backup_today(storages.iter().map(|s| s.retention()), &date, &days)
        {
            tracing::info!("No storage of '{}' takes a full backup today, skipping", job.name);
            report.skipped = true;
            return report;
        }

        let targets = targets(job, &mut report);

        let tmp = self
            .config
            .server
            .tmp_dir
            .join(format!("{}_{}", job.name, RunId::new()));
        if let Err(e) = fs::create_dir_all(&tmp) {
            report.push_error(format!("Cannot create temp dir {}: {}", tmp.display(), e));
            return report;
        }

        let mut janitor = Janitor::new(self.config.janitor_config());
        self.process(job, &storages, &targets, &tmp, date, &stamp, &mut janitor, &mut report)
            .await;

        if let Err(e) = fs::remove_dir_all(&tmp) {
            tracing::warn!("Failed to remove temp dir {}: {}", tmp.display(), e);
        }

        let metrics = janitor.metrics_mut();
        metrics.total_runtime_secs = started.elapsed().as_secs();
        report.failed = metrics.failed.clone();
        report.deleted = metrics.deleted.clone();
        report.reinits = metrics.reinits;
        report.runtime_secs = metrics.total_runtime_secs;
        tracing::debug!("\n{}", metrics.summary());

        if report.is_success() {
            tracing::info!(
                "Job '{}' finished: {}/{} artifacts delivered",
                job.name,
                report.delivered,
                report.artifacts
            );
        } else {
            tracing::error!(
                "Job '{}' finished with {} error(s)",
                job.name,
                report.errors.len()
            );
        }
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn process(
        &self,
        job: &JobConfig,
        storages: &StorageSet,
        targets: &[Target<'_>],
        tmp: &Path,
        date: RunDate,
        stamp: &str,
        janitor: &mut Janitor,
        report: &mut JobReport,
    ) {
        let keys: Vec<ArtifactKey> = targets.iter().map(|t| t.key.clone()).collect();
        let incremental = job.kind.is_incremental();

        if !job.safety_backup {
            if let Err(e) = rotate(janitor, storages, &keys, date, job).await {
                report.push_janitor_error(e);
            }
        }

        let mut dumps = DumpSet::new();
        let mut chains = BTreeMap::new();

        for target in targets {
            let dir = tmp.join(&target.source.name);
            if let Err(e) = fs::create_dir_all(&dir) {
                report.push_error(format!("Cannot create {}: {}", dir.display(), e));
                continue;
            }
            let artifact = dir.join(artifact_name(&target.key, target.source, stamp));

            let snapshot = if incremental {
                match self
                    .prepare_incremental(storages, target, &dir, &artifact, date, janitor)
                    .await
                {
                    Ok((chain, rotation_error)) => {
                        if let Some(e) = rotation_error {
                            report.push_janitor_error(e);
                        }
                        let snapshot = chain.snapshot.clone();
                        chains.insert(target.key.clone(), chain);
                        Some(snapshot)
                    }
                    Err(e) => {
                        report.push_janitor_error(e);
                        continue;
                    }
                }
            } else {
                None
            };

            match self
                .archive(target, &artifact, snapshot.as_deref())
                .await
            {
                Ok(()) => {
                    dumps.insert(target.key.clone(), DumpObject::new(artifact));
                }
                Err(e) => {
                    report.push_error(format!("Archiving {} failed: {}", target.key, e));
                    chains.remove(&target.key);
                }
            }
        }

        report.artifacts = dumps.len();
        let delivery = if incremental {
            janitor
                .deliver_incremental(storages, &mut dumps, &chains, date)
                .await
        } else {
            janitor.deliver_full(storages, &mut dumps, date).await
        };
        if let Err(e) = delivery {
            report.push_janitor_error(e);
        }
        report.delivered = dumps.iter().filter(|(_, dump)| dump.delivered).count();

        if job.safety_backup {
            if let Err(e) = rotate(janitor, storages, &keys, date, job).await {
                report.push_janitor_error(e);
            }
        }
    }

    /// Seed the chain of one target; a new chain deletes the key's old one
    async fn prepare_incremental(
        &self,
        storages: &StorageSet,
        target: &Target<'_>,
        dir: &Path,
        artifact: &Path,
        date: RunDate,
        janitor: &mut Janitor,
    ) -> std::result::Result<(ChainRun, Option<JanitorError>), JanitorError> {
        let snapshot = dir.join(format!("{}.inc", target.key.file_stem()));
        let chain = janitor
            .prepare_chain(storages, &target.key, &date, artifact, &snapshot)
            .await?;

        let mut rotation_error = None;
        if chain.is_init() {
            if let Err(e) = janitor
                .rotate_incremental(storages, std::slice::from_ref(&target.key), date, true)
                .await
            {
                rotation_error = Some(e);
            }
        }
        Ok((chain, rotation_error))
    }

    async fn archive(
        &self,
        target: &Target<'_>,
        artifact: &Path,
        snapshot: Option<&Path>,
    ) -> Result<()> {
        let archiver = self.archiver.clone();
        let source = target.path.to_path_buf();
        let destination = artifact.to_path_buf();
        let excludes = target.source.excludes.clone();
        let gzip = target.source.gzip;
        let snapshot = snapshot.map(Path::to_path_buf);

        tokio::task::spawn_blocking(move || {
            archiver.archive(&ArchiveRequest {
                source: &source,
                destination: &destination,
                excludes: &excludes,
                gzip,
                snapshot: snapshot.as_deref(),
            })
        })
        .await
        .map_err(|e| CliError::Archive(e.to_string()))?
        .map_err(|e| CliError::Archive(e.to_string()))
    }

    /// Job-scoped handles of the job's storages
    ///
    /// A storage that cannot be opened is reported and left out; the job
    /// fails only when none is left.
    fn storage_set(&mut self, job: &JobConfig) -> Result<StorageSet> {
        let mut handles: Vec<Arc<dyn Storage>> = Vec::with_capacity(job.storages.len());

        for use_ in &job.storages {
            match self.base_storage(&use_.storage) {
                Ok(base) => {
                    let handle = base.clone_for_job(use_.backup_path.clone(), use_.retention);
                    handles.push(Arc::from(handle));
                }
                Err(e) => {
                    tracing::error!("Storage '{}' unavailable: {}", use_.storage, e);
                }
            }
        }

        if handles.is_empty() {
            return Err(CliError::Config(format!(
                "No storage of job '{}' is available",
                job.name
            )));
        }
        Ok(StorageSet::new(handles))
    }

    fn base_storage(&mut self, name: &str) -> Result<Arc<dyn Storage>> {
        if let Some(storage) = self.opened.get(name) {
            return Ok(Arc::clone(storage));
        }
        let config = self
            .config
            .storage(name)
            .ok_or_else(|| CliError::Config(format!("Unknown storage '{}'", name)))?;
        let storage = open_storage(config.kind, &config.name, &config.path)?;
        self.opened.insert(name.to_string(), Arc::clone(&storage));
        Ok(storage)
    }
}

async fn rotate(
    janitor: &mut Janitor,
    storages: &StorageSet,
    keys: &[ArtifactKey],
    date: RunDate,
    job: &JobConfig,
) -> std::result::Result<(), JanitorError> {
    if job.kind.is_incremental() {
        janitor.rotate_incremental(storages, keys, date, false).await?;
    } else {
        janitor
            .rotate_full(storages, keys, date, job.safety_backup)
            .await?;
    }
    Ok(())
}

/// Targets of a job with their artifact keys
///
/// Targets whose key cannot be built are reported and skipped.
fn targets<'a>(job: &'a JobConfig, report: &mut JobReport) -> Vec<Target<'a>> {
    let mut targets = Vec::new();
    for source in &job.sources {
        for path in &source.targets {
            match ArtifactKey::for_target(&source.name, &path.to_string_lossy()) {
                Ok(key) => targets.push(Target {
                    key,
                    source,
                    path: path.as_path(),
                }),
                Err(e) => report.push_error(format!(
                    "Invalid target {} in source '{}': {}",
                    path.display(),
                    source.name,
                    e
                )),
            }
        }
    }
    targets
}

/// File name of the artifact of one key, unique per run minute
fn artifact_name(key: &ArtifactKey, source: &SourceConfig, stamp: &str) -> PathBuf {
    let mut name = format!("{}_{}.tar", key.file_stem(), stamp);
    if source.gzip {
        name.push_str(".gz");
    }
    PathBuf::from(name)
}
