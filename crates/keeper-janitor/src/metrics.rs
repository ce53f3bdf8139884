//! Metrics collection for Janitor operations

use keeper_domain::RotationReport;
use std::collections::BTreeMap;

/// Metrics collected during Janitor operations
///
/// Tracks deliveries and failures per storage, deletions per tier, and chain
/// reinitializations.
#[derive(Debug, Clone, Default)]
pub struct JanitorMetrics {
    /// Artifacts accepted per storage
    pub delivered: BTreeMap<String, usize>,

    /// Failed operations per storage
    pub failed: BTreeMap<String, usize>,

    /// Items deleted per tier label
    pub deleted: BTreeMap<String, usize>,

    /// Artifacts handed to the janitor for delivery
    pub artifacts: usize,

    /// Artifacts no storage accepted
    pub undelivered: usize,

    /// Incremental chains started from scratch
    pub reinits: usize,

    /// Total runtime in seconds
    pub total_runtime_secs: u64,
}

impl JanitorMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an artifact accepted by a storage
    pub fn record_delivery(&mut self, storage: &str) {
        *self.delivered.entry(storage.to_string()).or_insert(0) += 1;
    }

    /// Record a failed operation on a storage
    pub fn record_failure(&mut self, storage: &str) {
        *self.failed.entry(storage.to_string()).or_insert(0) += 1;
    }

    /// Record the deletions of a rotation
    pub fn record_rotation(&mut self, report: &RotationReport) {
        for (label, count) in &report.deleted {
            *self.deleted.entry(label.clone()).or_insert(0) += count;
        }
    }

    /// Record the outcome of one artifact
    pub fn record_artifact(&mut self, delivered: bool) {
        self.artifacts += 1;
        if !delivered {
            self.undelivered += 1;
        }
    }

    /// Record a chain reinitialization
    pub fn record_reinit(&mut self) {
        self.reinits += 1;
    }

    /// Get total deliveries across all storages
    pub fn total_delivered(&self) -> usize {
        self.delivered.values().sum()
    }

    /// Get total failures across all storages
    pub fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }

    /// Get total deletions across all tiers
    pub fn total_deleted(&self) -> usize {
        self.deleted.values().sum()
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Janitor Metrics Summary".to_string(),
            "======================".to_string(),
            format!("Artifacts: {} ({} undelivered)", self.artifacts, self.undelivered),
            format!("Chain reinits: {}", self.reinits),
            format!("Total runtime: {}s", self.total_runtime_secs),
            String::new(),
        ];

        if !self.delivered.is_empty() {
            lines.push("Deliveries by storage:".to_string());
            for (storage, count) in &self.delivered {
                lines.push(format!("  {}: {}", storage, count));
            }
            lines.push(format!("  Total: {}", self.total_delivered()));
            lines.push(String::new());
        }

        if !self.failed.is_empty() {
            lines.push("Failures by storage:".to_string());
            for (storage, count) in &self.failed {
                lines.push(format!("  {}: {}", storage, count));
            }
            lines.push(format!("  Total: {}", self.total_failed()));
            lines.push(String::new());
        }

        if !self.deleted.is_empty() {
            lines.push("Deletions by tier:".to_string());
            for (tier, count) in &self.deleted {
                lines.push(format!("  {}: {}", tier, count));
            }
            lines.push(format!("  Total: {}", self.total_deleted()));
        }

        lines.join("\n")
    }
}
