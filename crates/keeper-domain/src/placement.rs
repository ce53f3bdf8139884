//! Placement module - where a full-backup artifact lands on one storage
//!
//! Tiers are evaluated in priority order (Monthly, Weekly, Daily). The first
//! active tier becomes the primary destination and holds the bytes; every
//! later active tier becomes a link to it. Link targets are relative to the
//! link's own directory, so a backend can materialize them either as a true
//! symlink or as a duplicate write.

use crate::artifact::ArtifactKey;
use crate::calendar::{BackupDays, RunDate};
use crate::retention::{RetentionPolicy, Tier};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Destinations of one artifact on one storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Paths receiving the artifact bytes
    pub destinations: Vec<PathBuf>,

    /// Link path -> target path relative to the link's directory
    pub links: BTreeMap<PathBuf, PathBuf>,
}

impl Placement {
    /// Create an empty placement
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot: the first claim becomes the primary destination,
    /// every later claim links to it
    pub fn claim(&mut self, path: PathBuf) {
        match self.destinations.first() {
            None => self.destinations.push(path),
            Some(primary) => {
                let target = relative_target(&path, primary);
                self.links.insert(path, target);
            }
        }
    }

    /// The path holding the real content
    pub fn primary(&self) -> Option<&Path> {
        self.destinations.first().map(PathBuf::as_path)
    }

    /// Whether nothing is to be delivered
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty() && self.links.is_empty()
    }

    /// Every path the artifact will be retrievable from
    pub fn all_paths(&self) -> Vec<&Path> {
        self.destinations
            .iter()
            .chain(self.links.keys())
            .map(PathBuf::as_path)
            .collect()
    }

    /// Resolve a link to the path it points at
    pub fn resolve_link(&self, link: &Path) -> Option<PathBuf> {
        let target = self.links.get(link)?;
        Some(resolve_relative(link, target))
    }
}

/// Path of `target` relative to the directory containing `link`
///
/// # Examples
///
/// ```
/// use keeper_domain::placement::relative_target;
/// use std::path::{Path, PathBuf};
///
/// let rel = relative_target(
///     Path::new("/bak/db/daily/db.sql.gz"),
///     Path::new("/bak/db/monthly/db.sql.gz"),
/// );
/// assert_eq!(rel, PathBuf::from("../monthly/db.sql.gz"));
/// ```
pub fn relative_target(link: &Path, target: &Path) -> PathBuf {
    let link_dir = normalize(link.parent().unwrap_or_else(|| Path::new("")));
    let target = normalize(target);

    let base: Vec<Component<'_>> = link_dir.components().collect();
    let dest: Vec<Component<'_>> = target.components().collect();
    let common = base
        .iter()
        .zip(dest.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &dest[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

/// Resolve a link-relative target to a full path
pub fn resolve_relative(link: &Path, target: &Path) -> PathBuf {
    let dir = link.parent().unwrap_or_else(|| Path::new(""));
    normalize(&dir.join(target))
}

/// Lexically normalize a path, folding `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Directory of one full-backup tier: `<root>/<key>/<tier>`
pub fn full_tier_dir(root: &Path, key: &ArtifactKey, tier: Tier) -> PathBuf {
    root.join(key.as_path()).join(tier.as_str())
}

/// Every tier directory of a key, for rotation scans
pub fn full_tier_dirs(root: &Path, key: &ArtifactKey) -> Vec<(Tier, PathBuf)> {
    Tier::PRIORITY
        .iter()
        .map(|tier| (*tier, full_tier_dir(root, key, *tier)))
        .collect()
}

/// Placement of a full-backup artifact on one storage
///
/// Returns `None` when no tier is active on this date, in which case the
/// storage is skipped.
pub fn full_placement(
    artifact_file: &Path,
    key: &ArtifactKey,
    root: &Path,
    policy: &RetentionPolicy,
    date: &RunDate,
    days: &BackupDays,
) -> Option<Placement> {
    let file_name = artifact_file.file_name()?;
    let mut placement = Placement::new();

    for tier in Tier::PRIORITY {
        if policy.is_tier_active(tier, date, days) {
            placement.claim(full_tier_dir(root, key, tier).join(file_name));
        }
    }

    if placement.is_empty() {
        None
    } else {
        Some(placement)
    }
}
