//! Calendar module - the date a run is evaluated against
//!
//! Every tier decision of a run is taken against one [`RunDate`] captured at
//! job start, so a run that crosses midnight stays consistent.

use chrono::{Datelike, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
pub use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Default weekday on which the weekly tier receives an artifact
pub const WEEKLY_BACKUP_DAY: Weekday = Weekday::Sun;

/// Default day-of-month on which the monthly tier receives an artifact
pub const MONTHLY_BACKUP_DAY: u32 = 1;

/// Day-of-year that starts a new incremental chain
pub const YEARLY_BACKUP_DAY: u32 = 1;

/// Days-of-month that start a decade of an incremental chain
pub const DECADE_BACKUP_DAYS: [u32; 3] = [1, 11, 21];

/// Calendar date of a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunDate(NaiveDate);

impl RunDate {
    /// Wrap a calendar date
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build a run date from year, month and day
    ///
    /// # Examples
    ///
    /// ```
    /// use keeper_domain::RunDate;
    ///
    /// let date = RunDate::from_ymd(2024, 3, 15).unwrap();
    /// assert_eq!(date.dom(), 15);
    /// assert_eq!(date.decade_dir(), "day_11");
    /// ```
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// The underlying calendar date
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Calendar year
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Day of year (1-based)
    pub fn doy(&self) -> u32 {
        self.0.ordinal()
    }

    /// Day of month (1-based)
    pub fn dom(&self) -> u32 {
        self.0.day()
    }

    /// Month of year (1-based)
    pub fn moy(&self) -> u32 {
        self.0.month()
    }

    /// Day of week
    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    /// First day of the year
    pub fn is_year_boundary(&self) -> bool {
        self.doy() == YEARLY_BACKUP_DAY
    }

    /// First day of the month
    pub fn is_month_boundary(&self) -> bool {
        self.dom() == MONTHLY_BACKUP_DAY
    }

    /// First day of a decade (1st, 11th or 21st)
    pub fn is_decade_boundary(&self) -> bool {
        DECADE_BACKUP_DAYS.contains(&self.dom())
    }

    /// Day-of-month the current decade started on
    pub fn decade_start(&self) -> u32 {
        DECADE_BACKUP_DAYS
            .iter()
            .copied()
            .filter(|start| *start <= self.dom())
            .max()
            .unwrap_or(MONTHLY_BACKUP_DAY)
    }

    /// Directory name of the current decade (`day_01`, `day_11`, `day_21`)
    pub fn decade_dir(&self) -> String {
        format!("day_{:02}", self.decade_start())
    }

    /// Directory name of the current month (`month_01` .. `month_12`)
    pub fn month_dir(&self) -> String {
        format!("month_{:02}", self.moy())
    }

    /// The date `n` days earlier
    pub fn days_ago(&self, n: u32) -> NaiveDate {
        self.0 - chrono::Days::new(u64::from(n))
    }

    /// The date `n` months earlier, clamped to the last valid day of that month
    pub fn months_ago(&self, n: u32) -> NaiveDate {
        self.0.checked_sub_months(Months::new(n)).unwrap_or(NaiveDate::MIN)
    }

    /// Local-time midnight of this date
    pub fn start_of_day(&self) -> SystemTime {
        start_of_day(self.0)
    }
}

impl std::fmt::Display for RunDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local-time midnight of a calendar date
pub fn start_of_day(date: NaiveDate) -> SystemTime {
    let midnight = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(local) => SystemTime::from(local),
        // Midnight skipped by a DST jump
        None => SystemTime::from(midnight.and_utc()),
    }
}

/// Days on which the weekly and monthly tiers are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDays {
    /// Weekday of the weekly tier
    #[serde(default = "default_weekly")]
    pub weekly: Weekday,

    /// Day-of-month of the monthly tier
    #[serde(default = "default_monthly")]
    pub monthly: u32,
}

fn default_weekly() -> Weekday {
    WEEKLY_BACKUP_DAY
}

fn default_monthly() -> u32 {
    MONTHLY_BACKUP_DAY
}

impl Default for BackupDays {
    fn default() -> Self {
        Self {
            weekly: WEEKLY_BACKUP_DAY,
            monthly: MONTHLY_BACKUP_DAY,
        }
    }
}

/// Source of the current wall-clock time
///
/// Tests swap in a [`FixedClock`].
pub trait Clock: Send + Sync {
    /// Current local date and time
    fn now(&self) -> NaiveDateTime;

    /// Current run date
    fn today(&self) -> RunDate {
        RunDate::new(self.now().date())
    }
}

/// Clock backed by the system's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(NaiveDateTime);

impl FixedClock {
    /// Freeze the clock at the given instant
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// Freeze the clock at 03:00 on the given day
    pub fn on(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(3, 0, 0))
            .map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decade_start() {
        let cases = [(1, 1), (5, 1), (10, 1), (11, 11), (20, 11), (21, 21), (31, 21)];
        for (dom, start) in cases {
            let date = RunDate::from_ymd(2024, 1, dom).unwrap();
            assert_eq!(date.decade_start(), start, "dom {}", dom);
        }
    }

    #[test]
    fn test_boundaries() {
        let jan1 = RunDate::from_ymd(2024, 1, 1).unwrap();
        assert!(jan1.is_year_boundary());
        assert!(jan1.is_month_boundary());
        assert!(jan1.is_decade_boundary());

        let mar11 = RunDate::from_ymd(2024, 3, 11).unwrap();
        assert!(!mar11.is_year_boundary());
        assert!(!mar11.is_month_boundary());
        assert!(mar11.is_decade_boundary());

        let mar12 = RunDate::from_ymd(2024, 3, 12).unwrap();
        assert!(!mar12.is_decade_boundary());
    }

    #[test]
    fn test_dir_names() {
        let date = RunDate::from_ymd(2024, 7, 25).unwrap();
        assert_eq!(date.month_dir(), "month_07");
        assert_eq!(date.decade_dir(), "day_21");
    }

    #[test]
    fn test_months_ago_clamps() {
        let date = RunDate::from_ymd(2024, 3, 31).unwrap();
        assert_eq!(date.months_ago(1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_fixed_clock_today() {
        let clock = FixedClock::on(2023, 12, 31).unwrap();
        let today = clock.today();
        assert_eq!(today.doy(), 365);
        assert_eq!(today.weekday(), Weekday::Sun);
    }

    #[test]
    fn test_start_of_day_ordering() {
        let a = RunDate::from_ymd(2024, 5, 1).unwrap();
        let b = RunDate::from_ymd(2024, 5, 2).unwrap();
        assert!(a.start_of_day() < b.start_of_day());
    }
}
