//! Chain module - calendar-driven state machine for incremental backups
//!
//! An incremental chain lives under `<root>/<key>/<year>/`:
//!
//! ```text
//! <year>/
//!   year/                     yearly baseline artifacts
//!   month_MM/monthly/         monthly baseline artifacts
//!   month_MM/day_DD/          decade artifacts (DD = 01, 11, 21)
//!   inc_meta_info/            year.inc, month.inc, day.inc snapshots
//! ```
//!
//! Within a decade every artifact is a cumulative diff against the snapshot
//! taken at the decade start, so `day.inc` is only rewritten on boundary days.

use crate::artifact::ArtifactKey;
use crate::calendar::RunDate;
use crate::placement::Placement;
use std::path::{Path, PathBuf};

/// Directory holding the snapshot blobs of a year
pub const META_DIR: &str = "inc_meta_info";

/// Directory holding the yearly baseline artifacts
pub const YEAR_DIR: &str = "year";

/// Directory (under `month_MM`) holding the monthly baseline artifacts
pub const MONTHLY_DIR: &str = "monthly";

/// Suffix of the temp-side sentinel marking a chain reinitialization
pub const INIT_SUFFIX: &str = "init";

/// Calendar tier of an incremental chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IncTier {
    /// Baseline of the whole year
    Year,

    /// Baseline of a month
    Month,

    /// Decade run within a month
    Day,
}

impl IncTier {
    /// Tiers in the order they claim the primary slot
    pub const PRIORITY: [IncTier; 3] = [IncTier::Year, IncTier::Month, IncTier::Day];

    /// Get the tier name
    pub fn as_str(&self) -> &'static str {
        match self {
            IncTier::Year => "year",
            IncTier::Month => "month",
            IncTier::Day => "day",
        }
    }

    /// File name of this tier's snapshot blob
    pub fn meta_file(&self) -> &'static str {
        match self {
            IncTier::Year => "year.inc",
            IncTier::Month => "month.inc",
            IncTier::Day => "day.inc",
        }
    }
}

impl std::fmt::Display for IncTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a run within its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Fresh chain: the run is a full baseline at every tier
    YearBaseline,

    /// First day of a month
    MonthBaseline,

    /// Any other day; decade starts refresh `day.inc`
    DecadeRun,
}

/// Stored snapshot a run is seeded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    /// No seed: the archiver starts a fresh chain
    Fresh,

    /// Copy of an existing snapshot
    Stored(IncTier),
}

/// Outcome of seed selection for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPlan {
    /// The run starts a new chain
    pub init: bool,

    /// Snapshot to copy into the working snapshot file
    pub seed: Seed,

    /// Where the run sits in the chain
    pub state: ChainState,
}

impl SeedPlan {
    /// Whether a missing seed must fail the run
    ///
    /// `year.inc` is always optional (its absence reinitializes the chain);
    /// the month and decade seeds are required once chosen.
    pub fn seed_is_required(&self) -> bool {
        matches!(self.seed, Seed::Stored(IncTier::Month) | Seed::Stored(IncTier::Day))
    }
}

/// Select the seed of an incremental run
///
/// `year_meta_available` reports whether `year.inc` could be fetched; any
/// failure to fetch it reinitializes the chain.
///
/// # Examples
///
/// ```
/// use keeper_domain::{RunDate, Seed, IncTier};
/// use keeper_domain::chain::plan_seed;
///
/// let mid_decade = RunDate::from_ymd(2024, 3, 14).unwrap();
/// assert_eq!(plan_seed(&mid_decade, true).seed, Seed::Stored(IncTier::Day));
///
/// let new_year = RunDate::from_ymd(2024, 1, 1).unwrap();
/// assert!(plan_seed(&new_year, true).init);
/// ```
pub fn plan_seed(date: &RunDate, year_meta_available: bool) -> SeedPlan {
    let init = date.is_year_boundary() || !year_meta_available;
    if init {
        return SeedPlan {
            init,
            seed: Seed::Fresh,
            state: ChainState::YearBaseline,
        };
    }

    let state = if date.is_month_boundary() {
        ChainState::MonthBaseline
    } else {
        ChainState::DecadeRun
    };

    let seed = if !date.is_decade_boundary() {
        Seed::Stored(IncTier::Day)
    } else if date.moy() != 1 {
        Seed::Stored(IncTier::Month)
    } else {
        Seed::Stored(IncTier::Year)
    };

    SeedPlan { init, seed, state }
}

/// Year directory of a key: `<root>/<key>/<year>`
pub fn year_dir(root: &Path, key: &ArtifactKey, year: i32) -> PathBuf {
    root.join(key.as_path()).join(year.to_string())
}

/// Snapshot path relative to the storage's backup root
pub fn meta_rel_path(key: &ArtifactKey, year: i32, tier: IncTier) -> PathBuf {
    key.as_path()
        .join(year.to_string())
        .join(META_DIR)
        .join(tier.meta_file())
}

/// Full path of a snapshot blob
pub fn meta_path(root: &Path, key: &ArtifactKey, year: i32, tier: IncTier) -> PathBuf {
    root.join(meta_rel_path(key, year, tier))
}

/// Temp-side sentinel marking a run as a chain reinitialization
pub fn init_marker_path(artifact_file: &Path) -> PathBuf {
    let mut name = artifact_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(INIT_SUFFIX);
    artifact_file.with_file_name(name)
}

/// Placement of an incremental artifact and its mutated snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalPlacement {
    /// Where the artifact lands
    pub artifact: Placement,

    /// Where the mutated snapshot lands; `None` on ordinary mid-decade days
    pub snapshot: Option<Placement>,
}

/// Compute the placement of an incremental run on one storage
///
/// Year claims the primary slot on chain init or the first day of the year,
/// Month on the first of the month or chain init, and the decade-day slot
/// always receives the artifact (as a link when a higher tier claimed the
/// primary).
pub fn incremental_placement(
    artifact_file: &Path,
    key: &ArtifactKey,
    root: &Path,
    date: &RunDate,
    init: bool,
) -> Option<IncrementalPlacement> {
    let file_name = artifact_file.file_name()?;
    let base = year_dir(root, key, date.year());
    let month = base.join(date.month_dir());

    let year_slot = init || date.is_year_boundary();
    let month_slot = year_slot || date.is_month_boundary();

    let mut artifact = Placement::new();
    if year_slot {
        artifact.claim(base.join(YEAR_DIR).join(file_name));
    }
    if month_slot {
        artifact.claim(month.join(MONTHLY_DIR).join(file_name));
    }
    artifact.claim(month.join(date.decade_dir()).join(file_name));

    let mut snapshot = Placement::new();
    if year_slot {
        snapshot.claim(meta_path(root, key, date.year(), IncTier::Year));
    }
    if month_slot {
        snapshot.claim(meta_path(root, key, date.year(), IncTier::Month));
    }
    if month_slot || date.is_decade_boundary() {
        snapshot.claim(meta_path(root, key, date.year(), IncTier::Day));
    }

    Some(IncrementalPlacement {
        artifact,
        snapshot: if snapshot.is_empty() { None } else { Some(snapshot) },
    })
}
