//! Artifact module - keys, per-run dump objects and run identifiers

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Unique identifier of one job run, based on UUIDv7
///
/// UUIDv7 sorts chronologically, so temp directories of consecutive runs
/// list in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u128);

impl RunId {
    /// Generate a new UUIDv7-based RunId
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

/// Stable key of one (source, target) pair within a job
///
/// The key is the storage-relative prefix every artifact of the pair lives
/// under, and the aggregation key for delivery and rotation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Create a key from a prebuilt string
    ///
    /// # Errors
    /// Returns error if the key is empty or would escape the backup root
    pub fn new(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if value.is_empty() {
            return Err("Artifact key cannot be empty".to_string());
        }
        if value.starts_with('/') || value.split('/').any(|part| part == "..") {
            return Err(format!("Artifact key must stay under the backup root: {}", value));
        }
        Ok(Self(value))
    }

    /// Key of a filesystem target backed up by a named source
    ///
    /// The target path is flattened into a single component, so
    /// `("www", "/var/www/html")` becomes `www/var_www_html`.
    ///
    /// # Examples
    ///
    /// ```
    /// use keeper_domain::ArtifactKey;
    ///
    /// let key = ArtifactKey::for_target("www", "/var/www/html").unwrap();
    /// assert_eq!(key.as_str(), "www/var_www_html");
    /// ```
    pub fn for_target(source: &str, target: &str) -> Result<Self, String> {
        let flat = flatten_target(target);
        if flat.is_empty() {
            return Self::new(source);
        }
        Self::new(format!("{}/{}", source, flat))
    }

    /// Get the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the key as a relative path
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Last path component of the key, used to name artifact files
    pub fn file_stem(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flatten a target path into one path component
fn flatten_target(target: &str) -> String {
    target
        .trim_matches('/')
        .replace('/', "_")
        .replace("..", "_")
}

/// Artifact produced by one run for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpObject {
    /// Temp file holding the artifact bytes
    pub temp_file: PathBuf,

    /// Set once at least one storage accepted the artifact
    pub delivered: bool,
}

impl DumpObject {
    /// Wrap a freshly produced temp file
    pub fn new(temp_file: PathBuf) -> Self {
        Self {
            temp_file,
            delivered: false,
        }
    }
}

/// All dump objects of one job run, keyed by artifact key
///
/// Owned by the run; delivery marks entries by key lookup.
#[derive(Debug, Clone, Default)]
pub struct DumpSet {
    dumps: BTreeMap<ArtifactKey, DumpObject>,
}

impl DumpSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the dump produced for a key, replacing any earlier one
    pub fn insert(&mut self, key: ArtifactKey, dump: DumpObject) -> Option<DumpObject> {
        self.dumps.insert(key, dump)
    }

    /// Look up the dump of a key
    pub fn get(&self, key: &ArtifactKey) -> Option<&DumpObject> {
        self.dumps.get(key)
    }

    /// Mark a key delivered; returns false for an unknown key
    pub fn mark_delivered(&mut self, key: &ArtifactKey) -> bool {
        match self.dumps.get_mut(key) {
            Some(dump) => {
                dump.delivered = true;
                true
            }
            None => false,
        }
    }

    /// Iterate over keys and dumps in key order
    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactKey, &DumpObject)> {
        self.dumps.iter()
    }

    /// Keys whose artifact no storage accepted
    pub fn undelivered(&self) -> Vec<&ArtifactKey> {
        self.dumps
            .iter()
            .filter(|(_, dump)| !dump.delivered)
            .map(|(key, _)| key)
            .collect()
    }

    /// Number of dumps
    pub fn len(&self) -> usize {
        self.dumps.len()
    }

    /// Whether no dump was produced
    pub fn is_empty(&self) -> bool {
        self.dumps.is_empty()
    }

    /// Consume the set, yielding every temp file for cleanup
    pub fn into_temp_files(self) -> Vec<PathBuf> {
        self.dumps.into_values().map(|dump| dump.temp_file).collect()
    }
}
