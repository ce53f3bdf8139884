//! Retention module - tiers and the policy that keeps artifacts in them

use crate::calendar::{BackupDays, RunDate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Retention tier of a full backup
///
/// Each tier is a directory under the artifact key:
/// - Daily: receives an artifact on every run
/// - Weekly: receives an artifact on the weekly backup day
/// - Monthly: receives an artifact on the monthly backup day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Every run
    Daily,

    /// Once a week
    Weekly,

    /// Once a month
    Monthly,
}

impl Tier {
    /// Tiers in the order they claim the primary destination
    pub const PRIORITY: [Tier; 3] = [Tier::Monthly, Tier::Weekly, Tier::Daily];

    /// Get the tier name, which is also its directory name
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
        }
    }

    /// Parse a tier from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(Tier::Daily),
            "weekly" => Some(Tier::Weekly),
            "monthly" => Some(Tier::Monthly),
            _ => None,
        }
    }

    /// Whether today is a day this tier receives (and rotates) artifacts,
    /// independent of any policy
    pub fn is_scheduled(&self, date: &RunDate, days: &BackupDays) -> bool {
        match self {
            Tier::Daily => true,
            Tier::Weekly => date.weekday() == days.weekly,
            Tier::Monthly => date.dom() == days.monthly,
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid tier: {}", s))
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What survives a rotation of one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    /// Keep this many most-recent items
    Count(u32),

    /// Keep items modified on or after this day
    Date(NaiveDate),
}

/// Retention policy of one job on one storage
///
/// A zero count disables the tier. With `use_count` the counts are numbers of
/// items to keep, otherwise they are periods (days, weeks, months).
///
/// # Examples
///
/// ```
/// use keeper_domain::{RetentionPolicy, RunDate, Tier, BackupDays};
///
/// let policy = RetentionPolicy::new(7, 4, 6);
/// let sunday = RunDate::from_ymd(2024, 3, 10).unwrap();
/// assert!(policy.is_tier_active(Tier::Weekly, &sunday, &BackupDays::default()));
/// assert!(!policy.is_tier_active(Tier::Monthly, &sunday, &BackupDays::default()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Daily tier retention
    #[serde(default)]
    pub days: u32,

    /// Weekly tier retention
    #[serde(default)]
    pub weeks: u32,

    /// Monthly tier retention
    #[serde(default)]
    pub months: u32,

    /// Keep N items per tier instead of N periods
    #[serde(default, rename = "count_instead_of_period")]
    pub use_count: bool,
}

impl RetentionPolicy {
    /// Date-mode policy
    pub fn new(days: u32, weeks: u32, months: u32) -> Self {
        Self {
            days,
            weeks,
            months,
            use_count: false,
        }
    }

    /// Count-mode policy
    pub fn counting(days: u32, weeks: u32, months: u32) -> Self {
        Self {
            use_count: true,
            ..Self::new(days, weeks, months)
        }
    }

    /// Retention configured for a tier
    pub fn count(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Daily => self.days,
            Tier::Weekly => self.weeks,
            Tier::Monthly => self.months,
        }
    }

    /// Whether a tier is enabled at all
    pub fn is_enabled(&self, tier: Tier) -> bool {
        self.count(tier) > 0
    }

    /// Whether a tier accepts a new artifact on this date
    pub fn is_tier_active(&self, tier: Tier, date: &RunDate, days: &BackupDays) -> bool {
        self.is_enabled(tier) && tier.is_scheduled(date, days)
    }

    /// What a rotation of this tier keeps on this date
    ///
    /// Date mode subtracts the tier's period from the run date; month
    /// subtraction clamps to the end of the target month.
    pub fn cutoff(&self, tier: Tier, date: &RunDate) -> Cutoff {
        let n = self.count(tier);
        if self.use_count {
            return Cutoff::Count(n);
        }
        let cutoff = match tier {
            Tier::Daily => date.days_ago(n),
            Tier::Weekly => date.days_ago(n.saturating_mul(7)),
            Tier::Monthly => date.months_ago(n),
        };
        Cutoff::Date(cutoff)
    }

    /// Whether any tier would accept a full backup on this date
    pub fn needs_full_backup(&self, date: &RunDate, days: &BackupDays) -> bool {
        Tier::PRIORITY
            .iter()
            .any(|tier| self.is_tier_active(*tier, date, days))
    }

    /// Check the policy can ever store a full backup
    pub fn validate_full(&self) -> Result<(), String> {
        if self.days == 0 && self.weeks == 0 && self.months == 0 {
            return Err("retention disables every tier; at least one of days, weeks, months must be > 0".to_string());
        }
        Ok(())
    }
}

/// Whether a full-backup job must run today
///
/// A job runs if any of its storages would accept an artifact.
pub fn job_needs_full_backup_today<'a, I>(policies: I, date: &RunDate, days: &BackupDays) -> bool
where
    I: IntoIterator<Item = &'a RetentionPolicy>,
{
    policies
        .into_iter()
        .any(|policy| policy.needs_full_backup(date, days))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> RunDate {
        RunDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn test_tier_activity() {
        let days = BackupDays::default();
        let policy = RetentionPolicy::new(7, 4, 6);

        // 2024-03-13 is a Wednesday
        let wed = date(2024, 3, 13);
        assert!(policy.is_tier_active(Tier::Daily, &wed, &days));
        assert!(!policy.is_tier_active(Tier::Weekly, &wed, &days));
        assert!(!policy.is_tier_active(Tier::Monthly, &wed, &days));

        // 2024-09-01 is a Sunday and the 1st
        let sun1 = date(2024, 9, 1);
        assert!(policy.is_tier_active(Tier::Weekly, &sun1, &days));
        assert!(policy.is_tier_active(Tier::Monthly, &sun1, &days));
    }

    #[test]
    fn test_zero_disables_tier() {
        let days = BackupDays::default();
        let policy = RetentionPolicy::new(0, 4, 0);
        let sun = date(2024, 3, 10);
        assert!(!policy.is_tier_active(Tier::Daily, &sun, &days));
        assert!(policy.is_tier_active(Tier::Weekly, &sun, &days));
        assert!(!policy.needs_full_backup(&date(2024, 3, 11), &days));
    }

    #[test]
    fn test_configured_backup_days() {
        let days = BackupDays {
            weekly: chrono::Weekday::Mon,
            monthly: 15,
        };
        let policy = RetentionPolicy::new(0, 1, 1);
        assert!(policy.is_tier_active(Tier::Weekly, &date(2024, 3, 11), &days));
        assert!(policy.is_tier_active(Tier::Monthly, &date(2024, 3, 15), &days));
        assert!(!policy.is_tier_active(Tier::Monthly, &date(2024, 3, 1), &days));
    }

    #[test]
    fn test_date_cutoffs() {
        let policy = RetentionPolicy::new(7, 2, 3);
        let today = date(2024, 5, 20);
        assert_eq!(
            policy.cutoff(Tier::Daily, &today),
            Cutoff::Date(NaiveDate::from_ymd_opt(2024, 5, 13).unwrap())
        );
        assert_eq!(
            policy.cutoff(Tier::Weekly, &today),
            Cutoff::Date(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap())
        );
        assert_eq!(
            policy.cutoff(Tier::Monthly, &today),
            Cutoff::Date(NaiveDate::from_ymd_opt(2024, 2, 20).unwrap())
        );
    }

    #[test]
    fn test_count_cutoffs() {
        let policy = RetentionPolicy::counting(5, 3, 0);
        let today = date(2024, 5, 20);
        assert_eq!(policy.cutoff(Tier::Daily, &today), Cutoff::Count(5));
        assert_eq!(policy.cutoff(Tier::Weekly, &today), Cutoff::Count(3));
    }

    #[test]
    fn test_job_needs_full_backup_today() {
        let days = BackupDays::default();
        let weekly_only = RetentionPolicy::new(0, 4, 0);
        let monthly_only = RetentionPolicy::new(0, 0, 12);
        let wed = date(2024, 3, 13);
        let first = date(2024, 5, 1);

        assert!(!job_needs_full_backup_today([&weekly_only, &monthly_only], &wed, &days));
        assert!(job_needs_full_backup_today([&weekly_only, &monthly_only], &first, &days));
    }

    #[test]
    fn test_validate_full() {
        assert!(RetentionPolicy::new(0, 0, 0).validate_full().is_err());
        assert!(RetentionPolicy::new(1, 0, 0).validate_full().is_ok());
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(Tier::parse("Weekly"), Some(Tier::Weekly));
        assert_eq!("monthly".parse::<Tier>(), Ok(Tier::Monthly));
        assert!(Tier::parse("hourly").is_none());
    }
}
