//! Configuration for Janitor operations
//!
//! Defines the tier days and how hard a missing seed is looked for.

use keeper_domain::BackupDays;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Janitor
///
/// # Examples
///
/// ```
/// use keeper_janitor::JanitorConfig;
///
/// let config = JanitorConfig::default();
/// assert_eq!(config.seed_fetch_attempts, 3);
///
/// // Single lookup, no backoff
/// let config = JanitorConfig::no_retry();
/// assert_eq!(config.seed_fetch_attempts, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Lookups of `year.inc` before a failing backend is treated as missing
    /// Default: 3
    #[serde(default = "default_seed_fetch_attempts")]
    pub seed_fetch_attempts: u32,

    /// Backoff step between seed lookups (in milliseconds), multiplied by
    /// the attempt number
    /// Default: 500
    #[serde(default = "default_seed_retry_backoff_ms")]
    pub seed_retry_backoff_ms: u64,

    /// Days on which the weekly and monthly tiers are active
    #[serde(default)]
    pub backup_days: BackupDays,
}

fn default_seed_fetch_attempts() -> u32 {
    3
}

fn default_seed_retry_backoff_ms() -> u64 {
    500
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            seed_fetch_attempts: default_seed_fetch_attempts(),
            seed_retry_backoff_ms: default_seed_retry_backoff_ms(),
            backup_days: BackupDays::default(),
        }
    }
}

impl JanitorConfig {
    /// Configuration that looks a seed up once
    pub fn no_retry() -> Self {
        Self {
            seed_fetch_attempts: 1,
            seed_retry_backoff_ms: 0,
            ..Self::default()
        }
    }

    /// Get the backoff step as Duration
    pub fn seed_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.seed_retry_backoff_ms)
    }

    /// Check the configuration
    ///
    /// # Errors
    /// Returns error on zero attempts or an impossible monthly day
    pub fn validate(&self) -> Result<(), String> {
        if self.seed_fetch_attempts == 0 {
            return Err("seed_fetch_attempts must be at least 1".to_string());
        }
        if !(1..=28).contains(&self.backup_days.monthly) {
            return Err(format!(
                "monthly backup day must be within 1..=28, got {}",
                self.backup_days.monthly
            ));
        }
        Ok(())
    }
}
