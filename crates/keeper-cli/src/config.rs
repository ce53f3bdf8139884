//! Configuration management for the CLI.
//!
//! A single TOML file describes the storages and the jobs that deliver to
//! them:
//!
//! ```toml
//! [server]
//! tmp_dir = "/var/tmp/keeper"
//! weekly_day = "Sun"
//! monthly_day = 1
//!
//! [[storages]]
//! name = "disk"
//! type = "local"
//! path = "/mnt/backup"
//!
//! [[jobs]]
//! name = "www"
//! type = "inc_files"
//!
//! [[jobs.sources]]
//! name = "www"
//! targets = ["/var/www"]
//! excludes = ["*.log"]
//! gzip = true
//!
//! [[jobs.storages]]
//! storage = "disk"
//! backup_path = "/www"
//! retention = { days = 0, weeks = 0, months = 12 }
//! ```

use crate::error::{CliError, Result};
use chrono::Weekday;
use keeper_domain::{ArtifactKey, BackupDays, RetentionPolicy};
use keeper_janitor::JanitorConfig;
use keeper_store::StorageKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Keeper configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Process-wide settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Configured storages
    #[serde(default)]
    pub storages: Vec<StorageConfig>,

    /// Configured jobs, run in declaration order
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Directory holding per-run temp directories
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Advisory lock file
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    /// Weekday of the weekly tier
    #[serde(default = "default_weekly_day")]
    pub weekly_day: Weekday,

    /// Day-of-month of the monthly tier
    #[serde(default = "default_monthly_day")]
    pub monthly_day: u32,

    /// Attempts at reading `year.inc` before starting a new chain
    #[serde(default = "default_seed_fetch_attempts")]
    pub seed_fetch_attempts: u32,

    /// Backoff step between `year.inc` reads, in milliseconds
    #[serde(default = "default_seed_retry_backoff_ms")]
    pub seed_retry_backoff_ms: u64,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: OutputFormat,

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

/// A configured storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Unique storage name
    pub name: String,

    /// Backend kind
    #[serde(rename = "type")]
    pub kind: StorageKind,

    /// Mount point of the storage
    pub path: PathBuf,
}

/// Kind of a backup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Full archives rotated by daily/weekly/monthly retention
    Files,

    /// Incremental archives chained over the calendar
    IncFiles,
}

impl JobKind {
    /// Get the kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Files => "files",
            JobKind::IncFiles => "inc_files",
        }
    }

    /// Whether the job produces incremental archives
    pub fn is_incremental(&self) -> bool {
        matches!(self, JobKind::IncFiles)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name
    pub name: String,

    /// Job kind
    #[serde(rename = "type")]
    pub kind: JobKind,

    /// Rotate after delivery instead of before archiving
    #[serde(default)]
    pub safety_backup: bool,

    /// Sources to archive
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Storages the job delivers to
    #[serde(default)]
    pub storages: Vec<JobStorageConfig>,
}

/// A named group of targets archived together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name, the first component of every artifact key
    pub name: String,

    /// Paths to archive, one artifact each
    pub targets: Vec<PathBuf>,

    /// Patterns excluded from every target
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Compress the archives
    #[serde(default = "default_true")]
    pub gzip: bool,
}

/// Use of a configured storage by one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStorageConfig {
    /// Name of the configured storage
    pub storage: String,

    /// Job directory on the storage
    pub backup_path: PathBuf,

    /// Retention on this storage
    #[serde(default)]
    pub retention: RetentionPolicy,
}

/// Output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

impl KeeperConfig {
    /// Get the default configuration file path.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| CliError::Config("Could not find config directory".into()))?;
        Ok(dir.join("keeper").join("keeper.toml"))
    }

    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&contents)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: KeeperConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.janitor_config()
            .validate()
            .map_err(|e| CliError::Config(format!("[server]: {}", e)))?;

        let mut storage_names = HashSet::new();
        for storage in &self.storages {
            if !storage_names.insert(storage.name.as_str()) {
                return Err(CliError::Config(format!(
                    "Duplicate storage name '{}'",
                    storage.name
                )));
            }
        }

        let mut job_names = HashSet::new();
        for job in &self.jobs {
            if !job_names.insert(job.name.as_str()) {
                return Err(CliError::Config(format!(
                    "Duplicate job name '{}'",
                    job.name
                )));
            }
            job.validate(&storage_names)?;
        }

        Ok(())
    }

    /// Find a job by name.
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Find a storage by name.
    pub fn storage(&self, name: &str) -> Option<&StorageConfig> {
        self.storages.iter().find(|storage| storage.name == name)
    }

    /// Tier days shared by every job.
    pub fn backup_days(&self) -> BackupDays {
        BackupDays {
            weekly: self.server.weekly_day,
            monthly: self.server.monthly_day,
        }
    }

    /// Janitor settings derived from the server section.
    pub fn janitor_config(&self) -> JanitorConfig {
        JanitorConfig {
            seed_fetch_attempts: self.server.seed_fetch_attempts,
            seed_retry_backoff_ms: self.server.seed_retry_backoff_ms,
            backup_days: self.backup_days(),
        }
    }
}

impl JobConfig {
    fn validate(&self, storage_names: &HashSet<&str>) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(CliError::Config(format!(
                "Invalid job name '{}'",
                self.name
            )));
        }
        if self.sources.is_empty() {
            return Err(CliError::Config(format!(
                "Job '{}' has no sources",
                self.name
            )));
        }
        if self.storages.is_empty() {
            return Err(CliError::Config(format!(
                "Job '{}' has no storages",
                self.name
            )));
        }

        let mut keys = HashSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                return Err(CliError::Config(format!(
                    "Job '{}' has a source without a name",
                    self.name
                )));
            }
            if source.targets.is_empty() {
                return Err(CliError::Config(format!(
                    "Source '{}' of job '{}' has no targets",
                    source.name, self.name
                )));
            }
            for target in &source.targets {
                let key = ArtifactKey::for_target(&source.name, &target.to_string_lossy())
                    .map_err(|e| {
                        CliError::Config(format!("Job '{}': {}", self.name, e))
                    })?;
                if !keys.insert(key.clone()) {
                    return Err(CliError::Config(format!(
                        "Job '{}' archives two targets under the same key '{}'",
                        self.name, key
                    )));
                }
            }
        }

        for use_ in &self.storages {
            if !storage_names.contains(use_.storage.as_str()) {
                return Err(CliError::Config(format!(
                    "Job '{}' refers to unknown storage '{}'",
                    self.name, use_.storage
                )));
            }
            if self.kind == JobKind::Files {
                use_.retention.validate_full().map_err(|e| {
                    CliError::Config(format!(
                        "Job '{}' on storage '{}': {}",
                        self.name, use_.storage, e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            lock_file: default_lock_file(),
            weekly_day: default_weekly_day(),
            monthly_day: default_monthly_day(),
            seed_fetch_attempts: default_seed_fetch_attempts(),
            seed_retry_backoff_ms: default_seed_retry_backoff_ms(),
            format: default_format(),
            color: true,
        }
    }
}

fn default_tmp_dir() -> PathBuf {
    std::env::temp_dir().join("keeper")
}

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("keeper.lock")
}

fn default_weekly_day() -> Weekday {
    BackupDays::default().weekly
}

fn default_monthly_day() -> u32 {
    BackupDays::default().monthly
}

fn default_seed_fetch_attempts() -> u32 {
    JanitorConfig::default().seed_fetch_attempts
}

fn default_seed_retry_backoff_ms() -> u64 {
    JanitorConfig::default().seed_retry_backoff_ms
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
tmp_dir = "/var/tmp/keeper"
weekly_day = "Sat"
monthly_day = 15

[[storages]]
name = "disk"
type = "local"
path = "/mnt/backup"

[[storages]]
name = "nas"
type = "mount"
path = "/mnt/nas"

[[jobs]]
name = "www"
type = "inc_files"

[[jobs.sources]]
name = "www"
targets = ["/var/www"]
excludes = ["*.log"]

[[jobs.storages]]
storage = "disk"
backup_path = "/www"
retention = { days = 0, weeks = 0, months = 12 }

[[jobs]]
name = "etc"
type = "files"
safety_backup = true

[[jobs.sources]]
name = "etc"
targets = ["/etc"]
gzip = false

[[jobs.storages]]
storage = "nas"
backup_path = "/etc"
retention = { days = 5, weeks = 0, months = 0, count_instead_of_period = true }
"#;

    #[test]
    fn test_parse_sample() {
        let config = KeeperConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.server.tmp_dir, PathBuf::from("/var/tmp/keeper"));
        assert_eq!(config.backup_days().weekly, Weekday::Sat);
        assert_eq!(config.backup_days().monthly, 15);
        assert_eq!(config.storages.len(), 2);
        assert_eq!(config.storages[1].kind, StorageKind::Mount);

        let www = config.job("www").unwrap();
        assert_eq!(www.kind, JobKind::IncFiles);
        assert!(!www.safety_backup);
        assert!(www.sources[0].gzip);
        assert_eq!(www.storages[0].retention.months, 12);

        let etc = config.job("etc").unwrap();
        assert!(etc.safety_backup);
        assert!(!etc.sources[0].gzip);
        assert!(etc.storages[0].retention.use_count);
    }

    #[test]
    fn test_defaults() {
        let config = KeeperConfig::from_toml("").unwrap();
        assert!(config.jobs.is_empty());
        assert_eq!(config.server.seed_fetch_attempts, 3);
        assert_eq!(config.backup_days(), BackupDays::default());
        assert!(config.server.color);
    }

    #[test]
    fn test_janitor_config() {
        let config = KeeperConfig::from_toml(SAMPLE).unwrap();
        let janitor = config.janitor_config();
        assert_eq!(janitor.backup_days.weekly, Weekday::Sat);
        assert_eq!(janitor.seed_fetch_attempts, 3);
        assert_eq!(janitor.seed_retry_backoff_ms, 500);

        let toml = SAMPLE.replace(
            "monthly_day = 15",
            "monthly_day = 15\nseed_fetch_attempts = 5\nseed_retry_backoff_ms = 2000",
        );
        let janitor = KeeperConfig::from_toml(&toml).unwrap().janitor_config();
        assert_eq!(janitor.seed_fetch_attempts, 5);
        assert_eq!(janitor.seed_retry_backoff(), std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_zero_seed_attempts_rejected() {
        let toml = SAMPLE.replace("monthly_day = 15", "monthly_day = 15\nseed_fetch_attempts = 0");
        let err = KeeperConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("seed_fetch_attempts must be at least 1"));
    }

    #[test]
    fn test_colliding_target_keys_rejected() {
        let toml = SAMPLE.replace(
            "targets = [\"/var/www\"]",
            "targets = [\"/var/www\", \"/var_www\"]",
        );
        let err = KeeperConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("same key 'www/var_www'"));
    }

    #[test]
    fn test_unknown_storage_rejected() {
        let toml = SAMPLE.replace("storage = \"nas\"", "storage = \"tape\"");
        let err = KeeperConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown storage 'tape'"));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let toml = SAMPLE.replace("name = \"etc\"\ntype", "name = \"www\"\ntype");
        let err = KeeperConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate job name 'www'"));
    }

    #[test]
    fn test_empty_full_retention_rejected() {
        let toml = SAMPLE.replace(
            "days = 5, weeks = 0, months = 0, count_instead_of_period = true",
            "days = 0, weeks = 0, months = 0",
        );
        assert!(KeeperConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_invalid_monthly_day_rejected() {
        let toml = SAMPLE.replace("monthly_day = 15", "monthly_day = 31");
        let err = KeeperConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("monthly backup day must be within 1..=28"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = KeeperConfig::from_file(&path).unwrap();
        assert_eq!(config.jobs.len(), 2);

        let err = KeeperConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
