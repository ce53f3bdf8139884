//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the lifecycle engine and the
//! infrastructure: storage backends and the archiving tool. Implementations
//! live in other crates.

use crate::placement::Placement;
use crate::retention::RetentionPolicy;
use crate::rotation::{FileEntry, RotationReport, RotationRequest};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sort rank of a storage within a job's storage set
///
/// Local storages sort last so snapshot lookups, which walk the set
/// backwards, try them first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageRank {
    /// Network or object storage
    Remote = 0,

    /// Storage on the local filesystem
    Local = 1,
}

/// Errors reported by a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// The requested path does not exist
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// I/O failure on a path
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path the operation failed on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Wrap an I/O error, mapping `NotFound` to [`StorageError::NotFound`]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path)
        } else {
            StorageError::Io { path, source }
        }
    }

    /// Whether the error means the path does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// A storage backend, cloned per job
///
/// Paths passed to `deliver`, `list_*` and `remove_*` are storage paths that
/// already include [`Storage::backup_root`]; `read_file` takes a path
/// relative to it. Whether links become true symlinks or duplicate writes is
/// the backend's decision: every listed path must serve identical content.
///
/// Implemented by the infrastructure layer (keeper-store)
pub trait Storage: Send + Sync + fmt::Debug {
    /// Configured name of the storage
    fn name(&self) -> &str;

    /// Sort rank within a storage set
    fn rank(&self) -> StorageRank;

    /// Backup root of the job this handle belongs to
    fn backup_root(&self) -> &Path;

    /// Retention of the job on this storage
    fn retention(&self) -> &RetentionPolicy;

    /// Write an artifact to every destination and materialize every link
    fn deliver(&self, artifact: &Path, placement: &Placement) -> Result<(), StorageError>;

    /// Read a stored file, relative to the backup root
    fn read_file(&self, rel_path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Files (and links) directly inside a directory; empty when it is missing
    fn list_files(&self, dir: &Path) -> Result<Vec<FileEntry>, StorageError>;

    /// Names of the subdirectories of a directory; empty when it is missing
    fn list_dirs(&self, dir: &Path) -> Result<Vec<String>, StorageError>;

    /// Delete one file or link
    fn remove_file(&self, path: &Path) -> Result<(), StorageError>;

    /// Delete a directory tree; a missing tree is not an error
    fn remove_tree(&self, path: &Path) -> Result<(), StorageError>;

    /// Independent handle for one job, sharing the underlying connection
    fn clone_for_job(&self, backup_root: PathBuf, retention: RetentionPolicy) -> Box<dyn Storage>;

    /// Delete aged artifacts according to the handle's retention
    fn rotate(&self, request: &RotationRequest<'_>) -> Result<RotationReport, StorageError> {
        crate::rotation::rotate(self, request)
    }
}

/// Input of one archiver invocation
#[derive(Debug, Clone, Copy)]
pub struct ArchiveRequest<'a> {
    /// Path to archive
    pub source: &'a Path,

    /// File the archive is written to
    pub destination: &'a Path,

    /// Patterns excluded from the archive
    pub excludes: &'a [String],

    /// Compress the archive
    pub gzip: bool,

    /// Snapshot file mutated in place by an incremental run
    pub snapshot: Option<&'a Path>,
}

/// Trait for producing backup artifacts
///
/// Implemented by the application layer (keeper-cli)
pub trait Archiver: Send + Sync {
    /// Error type for archive operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write the archive of `request.source` to `request.destination`
    fn archive(&self, request: &ArchiveRequest<'_>) -> Result<(), Self::Error>;
}
