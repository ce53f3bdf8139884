//! Keeper Storage Layer
//!
//! Implements the [`Storage`] trait from keeper-domain for the backends a
//! job can deliver to.
//!
//! # Architecture
//!
//! - [`LocalStorage`] for filesystems (local disks and network mounts),
//!   materializing links as true relative symlinks
//! - [`ObjectStorage`] for bucket-style backends behind an [`ObjectClient`],
//!   materializing links as duplicate objects
//! - [`StorageSet`] for a job's ordered storages and snapshot lookups
//!
//! # Examples
//!
//! ```no_run
//! use keeper_domain::RetentionPolicy;
//! use keeper_store::{open_storage, StorageKind};
//!
//! let base = open_storage(StorageKind::Local, "disk", "/mnt/backup").unwrap();
//! let job = base.clone_for_job("/www".into(), RetentionPolicy::new(7, 4, 6));
//! assert_eq!(job.name(), "disk");
//! ```

#![warn(missing_docs)]

pub mod local;
pub mod memory;
pub mod object;
pub mod set;

pub use local::LocalStorage;
pub use memory::MemoryObjectClient;
pub use object::{ObjectClient, ObjectInfo, ObjectStorage};
pub use set::{SetRead, StorageSet};

use keeper_domain::Storage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while opening a storage
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid storage configuration
    #[error("Invalid storage config: {0}")]
    InvalidConfig(String),

    /// Mount point missing or not a directory
    #[error("Storage mount unavailable: {}", .0.display())]
    MountUnavailable(PathBuf),
}

/// Kind of a configured storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Local filesystem
    Local,

    /// Network filesystem mounted locally (NFS, SMB, SFTP via fuse)
    Mount,
}

impl StorageKind {
    /// Get the kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Mount => "mount",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open a configured storage as a base handle
///
/// The base handle has an empty backup root and no retention; jobs derive
/// their own handles with [`Storage::clone_for_job`].
///
/// # Errors
/// Returns error if the path is relative or is not an existing directory
pub fn open_storage(
    kind: StorageKind,
    name: &str,
    path: impl AsRef<Path>,
) -> Result<Arc<dyn Storage>, StoreError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Err(StoreError::MountUnavailable(path.to_path_buf()));
    }
    let storage = match kind {
        StorageKind::Local => LocalStorage::new(name, path)?,
        StorageKind::Mount => LocalStorage::mounted(name, path)?,
    };
    tracing::debug!("Opened {} storage '{}' at {}", kind, name, path.display());
    Ok(Arc::new(storage))
}
