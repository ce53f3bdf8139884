//! Rotation module - which stored artifacts a retention policy deletes
//!
//! Full backups are rotated per tier, by cutoff date or by count. Count mode
//! keeps exactly `count` items once the run's new artifact exists: jobs that
//! rotate before producing it (non-safety) keep `count - 1`, jobs that rotate
//! after delivering it (safety) keep `count`.
//!
//! Incremental backups are rotated per key, either by deleting the whole
//! chain or by pruning month directories past the retention window.

use crate::artifact::ArtifactKey;
use crate::calendar::{self, BackupDays, RunDate};
use crate::placement::full_tier_dirs;
use crate::retention::Cutoff;
use crate::traits::{Storage, StorageError};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

/// A stored file and its modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Storage path of the file
    pub path: PathBuf,

    /// Last modification time
    pub modified: SystemTime,
}

/// What a rotation should delete
#[derive(Debug, Clone, Copy)]
pub enum RotationRequest<'a> {
    /// Tiered rotation of full backups
    Full {
        /// Keys to rotate
        keys: &'a [ArtifactKey],
        /// Run date
        date: RunDate,
        /// Weekly/monthly tier days
        days: BackupDays,
        /// The run's new artifact is already stored
        safety: bool,
    },

    /// Rotation of incremental chains
    Incremental {
        /// Keys to rotate
        keys: &'a [ArtifactKey],
        /// Run date
        date: RunDate,
        /// Delete each key's whole chain instead of pruning old months
        full: bool,
    },
}

/// Number of items deleted by a rotation, per tier label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Deleted items per tier label
    pub deleted: BTreeMap<String, usize>,
}

impl RotationReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record deletions under a tier label
    pub fn record(&mut self, label: &str, count: usize) {
        if count > 0 {
            *self.deleted.entry(label.to_string()).or_insert(0) += count;
        }
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: &RotationReport) {
        for (label, count) in &other.deleted {
            self.record(label, *count);
        }
    }

    /// Total items deleted
    pub fn total(&self) -> usize {
        self.deleted.values().sum()
    }
}

/// Items a count-mode rotation keeps
pub fn retained_count(count: u32, safety: bool) -> usize {
    let count = count as usize;
    if safety {
        count
    } else {
        count.saturating_sub(1)
    }
}

/// Select the entries a tier rotation deletes
///
/// Count mode deletes the oldest entries beyond the retained count (never
/// more than exist). Date mode deletes entries modified strictly before the
/// start of the cutoff day.
pub fn select_expired(mut entries: Vec<FileEntry>, cutoff: Cutoff, safety: bool) -> Vec<PathBuf> {
    match cutoff {
        Cutoff::Count(count) => {
            entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
            let excess = entries.len().saturating_sub(retained_count(count, safety));
            entries.into_iter().take(excess).map(|e| e.path).collect()
        }
        Cutoff::Date(date) => {
            let threshold = calendar::start_of_day(date);
            entries
                .into_iter()
                .filter(|e| e.modified < threshold)
                .map(|e| e.path)
                .collect()
        }
    }
}

/// Parse a `month_MM` directory name
pub fn parse_month_dir(name: &str) -> Option<u32> {
    let month: u32 = name.strip_prefix("month_")?.parse().ok()?;
    (1..=12).contains(&month).then_some(month)
}

/// Whether a chain month falls before the retention window
pub fn month_is_expired(year: i32, month: u32, date: &RunDate, months: u32) -> bool {
    let window = date.months_ago(months);
    let window_start = NaiveDate::from_ymd_opt(window.year(), window.month(), 1);
    let month_start = NaiveDate::from_ymd_opt(year, month, 1);
    match (month_start, window_start) {
        (Some(month_start), Some(window_start)) => month_start < window_start,
        _ => false,
    }
}

/// Default rotation shared by every backend
pub fn rotate<S: Storage + ?Sized>(
    storage: &S,
    request: &RotationRequest<'_>,
) -> Result<RotationReport, StorageError> {
    match *request {
        RotationRequest::Full {
            keys,
            date,
            days,
            safety,
        } => rotate_full(storage, keys, &date, &days, safety),
        RotationRequest::Incremental { keys, date, full } => {
            rotate_incremental(storage, keys, &date, full)
        }
    }
}

fn rotate_full<S: Storage + ?Sized>(
    storage: &S,
    keys: &[ArtifactKey],
    date: &RunDate,
    days: &BackupDays,
    safety: bool,
) -> Result<RotationReport, StorageError> {
    let policy = *storage.retention();
    let mut report = RotationReport::new();

    for key in keys {
        for (tier, dir) in full_tier_dirs(storage.backup_root(), key) {
            // Disabled tiers are never touched; scheduled tiers rotate on the
            // days they receive artifacts.
            if !policy.is_tier_active(tier, date, days) {
                continue;
            }
            let entries = storage.list_files(&dir)?;
            let expired = select_expired(entries, policy.cutoff(tier, date), safety);
            for path in &expired {
                storage.remove_file(path)?;
            }
            report.record(tier.as_str(), expired.len());
        }
    }

    Ok(report)
}

fn rotate_incremental<S: Storage + ?Sized>(
    storage: &S,
    keys: &[ArtifactKey],
    date: &RunDate,
    full: bool,
) -> Result<RotationReport, StorageError> {
    let months = storage.retention().months;
    let mut report = RotationReport::new();

    for key in keys {
        let key_dir = storage.backup_root().join(key.as_path());
        if full {
            storage.remove_tree(&key_dir)?;
            report.record("chain", 1);
            continue;
        }
        if months == 0 {
            continue;
        }

        for year_name in storage.list_dirs(&key_dir)? {
            let Ok(year) = year_name.parse::<i32>() else {
                continue;
            };
            let year_path = key_dir.join(&year_name);
            let mut remaining = 0;
            for month_name in storage.list_dirs(&year_path)? {
                let Some(month) = parse_month_dir(&month_name) else {
                    continue;
                };
                if month_is_expired(year, month, date, months) {
                    storage.remove_tree(&year_path.join(&month_name))?;
                    report.record("month", 1);
                } else {
                    remaining += 1;
                }
            }
            if year < date.year() && remaining == 0 {
                storage.remove_tree(&year_path)?;
                report.record("year", 1);
            }
        }
    }

    Ok(report)
}
