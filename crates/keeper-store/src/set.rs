//! Ordered storages of one job
//!
//! Storages are sorted by rank (remote first, local last, stable within a
//! rank). Snapshot lookups walk the set backwards: local disks first, then
//! remotes in reverse declaration order.

use keeper_domain::{Storage, StorageError};
use std::path::Path;
use std::sync::Arc;

/// A snapshot read from the first storage that had it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRead {
    /// File content
    pub data: Vec<u8>,

    /// Name of the storage that served it
    pub storage: String,
}

/// Job-scoped storage handles in rank order
#[derive(Debug, Clone, Default)]
pub struct StorageSet {
    storages: Vec<Arc<dyn Storage>>,
}

impl StorageSet {
    /// Build a set, sorting handles local-last
    pub fn new(mut storages: Vec<Arc<dyn Storage>>) -> Self {
        storages.sort_by_key(|s| s.rank());
        Self { storages }
    }

    /// Handles in rank order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Storage>> {
        self.storages.iter()
    }

    /// Handles in snapshot lookup order
    pub fn lookup_order(&self) -> impl Iterator<Item = &Arc<dyn Storage>> {
        self.storages.iter().rev()
    }

    /// Storage names in rank order
    pub fn names(&self) -> Vec<&str> {
        self.storages.iter().map(|s| s.name()).collect()
    }

    /// Number of storages
    pub fn len(&self) -> usize {
        self.storages.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }

    /// Read a file from the first storage in lookup order that has it
    ///
    /// When every storage fails, the error returned is the last failure that
    /// was not a `NotFound`, or `NotFound` when the file is missing
    /// everywhere. Callers can tell a genuinely missing file from a backend
    /// failure.
    pub fn read_first(&self, rel_path: &Path) -> Result<SetRead, StorageError> {
        let mut not_found = None;
        let mut failure = None;

        for storage in self.lookup_order() {
            match storage.read_file(rel_path) {
                Ok(data) => {
                    return Ok(SetRead {
                        data,
                        storage: storage.name().to_string(),
                    })
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!("{} not on '{}'", rel_path.display(), storage.name());
                    not_found = Some(e);
                }
                Err(e) => {
                    tracing::warn!("Reading {} from '{}' failed: {}", rel_path.display(), storage.name(), e);
                    failure = Some(e);
                }
            }
        }

        Err(failure
            .or(not_found)
            .unwrap_or_else(|| StorageError::NotFound(rel_path.to_path_buf())))
    }
}
