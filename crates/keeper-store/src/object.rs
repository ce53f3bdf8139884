//! Bucket-style storage over a key/value object client
//!
//! Object stores have no symlinks, so every link of a placement is written
//! as a duplicate object. Directories are key prefixes.

use keeper_domain::{FileEntry, Placement, RetentionPolicy, Storage, StorageError, StorageRank};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Metadata of one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,

    /// Last write time
    pub modified: SystemTime,
}

/// Client of a bucket-style backend
///
/// Keys use `/` as separator and never start with one. Protocol clients
/// (S3, FTP, WebDAV) plug in here.
pub trait ObjectClient: Send + Sync + fmt::Debug {
    /// Store an object, replacing any existing one
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Fetch an object
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Every object whose key starts with `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Delete an object
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage on an object backend, with links as duplicate objects
#[derive(Debug)]
pub struct ObjectStorage<C: ObjectClient> {
    name: String,
    client: Arc<C>,
    backup_root: PathBuf,
    retention: RetentionPolicy,
}

impl<C: ObjectClient> Clone for ObjectStorage<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            client: Arc::clone(&self.client),
            backup_root: self.backup_root.clone(),
            retention: self.retention,
        }
    }
}

impl<C: ObjectClient> ObjectStorage<C> {
    /// Wrap a client as a base storage handle
    pub fn new(name: impl Into<String>, client: C) -> Self {
        Self {
            name: name.into(),
            client: Arc::new(client),
            backup_root: PathBuf::new(),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Object key of a storage path
pub fn object_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn dir_prefix(dir: &Path) -> String {
    let key = object_key(dir);
    if key.is_empty() {
        key
    } else {
        format!("{}/", key)
    }
}

impl<C: ObjectClient + 'static> Storage for ObjectStorage<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> StorageRank {
        StorageRank::Remote
    }

    fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    fn deliver(&self, artifact: &Path, placement: &Placement) -> Result<(), StorageError> {
        let data = fs::read(artifact).map_err(|e| StorageError::io(artifact, e))?;
        for path in placement.all_paths() {
            self.client.put(&object_key(path), &data)?;
        }
        tracing::debug!(
            "Delivered {} to '{}' as {} objects",
            artifact.display(),
            self.name,
            placement.destinations.len() + placement.links.len()
        );
        Ok(())
    }

    fn read_file(&self, rel_path: &Path) -> Result<Vec<u8>, StorageError> {
        self.client.get(&object_key(&self.backup_root.join(rel_path)))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<FileEntry>, StorageError> {
        let prefix = dir_prefix(dir);
        Ok(self
            .client
            .list(&prefix)?
            .into_iter()
            .filter_map(|info| {
                let rest = info.key.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    return None;
                }
                Some(FileEntry {
                    path: dir.join(rest),
                    modified: info.modified,
                })
            })
            .collect())
    }

    fn list_dirs(&self, dir: &Path) -> Result<Vec<String>, StorageError> {
        let prefix = dir_prefix(dir);
        let names: BTreeSet<String> = self
            .client
            .list(&prefix)?
            .into_iter()
            .filter_map(|info| {
                let rest = info.key.strip_prefix(&prefix)?;
                let (first, _) = rest.split_once('/')?;
                Some(first.to_string())
            })
            .collect();
        Ok(names.into_iter().collect())
    }

    fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        self.client.delete(&object_key(path))
    }

    fn remove_tree(&self, path: &Path) -> Result<(), StorageError> {
        for info in self.client.list(&dir_prefix(path))? {
            self.client.delete(&info.key)?;
        }
        Ok(())
    }

    fn clone_for_job(&self, backup_root: PathBuf, retention: RetentionPolicy) -> Box<dyn Storage> {
        Box::new(Self {
            backup_root,
            retention,
            ..self.clone()
        })
    }
}
