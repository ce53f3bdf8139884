//! In-process object client
//!
//! Clones share one bucket, the way job handles share a connection.

use crate::object::{ObjectClient, ObjectInfo};
use keeper_domain::StorageError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    modified: SystemTime,
}

/// Object client keeping every object in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectClient {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
}

impl MemoryObjectClient {
    /// Create an empty bucket
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredObject>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("memory bucket lock poisoned".to_string()))
    }

    /// Store an object with an explicit write time
    pub fn put_at(&self, key: &str, data: &[u8], modified: SystemTime) {
        if let Ok(mut objects) = self.lock() {
            objects.insert(
                key.to_string(),
                StoredObject {
                    data: data.to_vec(),
                    modified,
                },
            );
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    /// Whether the bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored key, sorted
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectClient for MemoryObjectClient {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.lock()?.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()?
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(PathBuf::from(key)))
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        Ok(self
            .lock()?
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                modified: object.modified,
            })
            .collect())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(PathBuf::from(key)))
    }
}
