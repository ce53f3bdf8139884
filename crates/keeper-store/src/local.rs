//! Filesystem-backed storage
//!
//! Storage paths are logical: `<backup_root>/<key>/...`. They are mapped
//! under the mount point at I/O time, so a link target computed relative to
//! the link's directory stays valid on disk.

use crate::StoreError;
use keeper_domain::{FileEntry, Placement, RetentionPolicy, Storage, StorageError, StorageRank};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Storage on a mounted filesystem, with true symlinks
#[derive(Debug, Clone)]
pub struct LocalStorage {
    name: String,
    mount: PathBuf,
    rank: StorageRank,
    backup_root: PathBuf,
    retention: RetentionPolicy,
}

impl LocalStorage {
    /// Storage on a local disk
    ///
    /// # Errors
    /// Returns error if the mount point is not an absolute path
    pub fn new(name: impl Into<String>, mount: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_rank(name.into(), mount.into(), StorageRank::Local)
    }

    /// Storage on a network filesystem mounted locally
    ///
    /// Ranked remote, so snapshot lookups try it after local disks.
    ///
    /// # Errors
    /// Returns error if the mount point is not an absolute path
    pub fn mounted(name: impl Into<String>, mount: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_rank(name.into(), mount.into(), StorageRank::Remote)
    }

    fn with_rank(name: String, mount: PathBuf, rank: StorageRank) -> Result<Self, StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidConfig("storage name cannot be empty".to_string()));
        }
        if !mount.is_absolute() {
            return Err(StoreError::InvalidConfig(format!(
                "mount point of '{}' must be absolute: {}",
                name,
                mount.display()
            )));
        }
        Ok(Self {
            name,
            mount,
            rank,
            backup_root: PathBuf::new(),
            retention: RetentionPolicy::default(),
        })
    }

    /// Map a storage path onto the filesystem
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let mut out = self.mount.clone();
        for component in path.components() {
            if let Component::Normal(part) = component {
                out.push(part);
            }
        }
        out
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        Ok(())
    }
}

/// Remove whatever file or link sits at `path`, never following a link
fn clear_slot(path: &Path) -> Result<(), StorageError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(StorageError::Backend(format!(
            "refusing to replace directory {}",
            path.display()
        ))),
        Ok(_) => fs::remove_file(path).map_err(|e| StorageError::io(path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    // No portable symlinks; fall back to a duplicate copy of the primary
    let source = link.parent().unwrap_or_else(|| Path::new("")).join(target);
    fs::copy(source, link).map(|_| ())
}

impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> StorageRank {
        self.rank
    }

    fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    fn deliver(&self, artifact: &Path, placement: &Placement) -> Result<(), StorageError> {
        for destination in &placement.destinations {
            let path = self.resolve(destination);
            self.ensure_parent(&path)?;
            clear_slot(&path)?;
            fs::copy(artifact, &path).map_err(|e| StorageError::io(&path, e))?;
        }

        for (link, target) in &placement.links {
            let path = self.resolve(link);
            self.ensure_parent(&path)?;
            clear_slot(&path)?;
            make_link(target, &path).map_err(|e| StorageError::io(&path, e))?;
        }

        tracing::debug!(
            "Delivered {} to '{}' ({} copies, {} links)",
            artifact.display(),
            self.name,
            placement.destinations.len(),
            placement.links.len()
        );
        Ok(())
    }

    fn read_file(&self, rel_path: &Path) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(&self.backup_root.join(rel_path));
        fs::read(&path).map_err(|e| StorageError::io(rel_path, e))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<FileEntry>, StorageError> {
        let fs_dir = self.resolve(dir);
        let entries = match fs::read_dir(&fs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&fs_dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&fs_dir, e))?;
            let meta = fs::symlink_metadata(entry.path()).map_err(|e| StorageError::io(entry.path(), e))?;
            if meta.is_dir() {
                continue;
            }
            let modified = meta.modified().map_err(|e| StorageError::io(entry.path(), e))?;
            files.push(FileEntry {
                path: dir.join(entry.file_name()),
                modified,
            });
        }
        Ok(files)
    }

    fn list_dirs(&self, dir: &Path) -> Result<Vec<String>, StorageError> {
        let fs_dir = self.resolve(dir);
        let entries = match fs::read_dir(&fs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&fs_dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&fs_dir, e))?;
            let file_type = entry.file_type().map_err(|e| StorageError::io(entry.path(), e))?;
            if file_type.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        let fs_path = self.resolve(path);
        fs::remove_file(&fs_path).map_err(|e| StorageError::io(path, e))
    }

    fn remove_tree(&self, path: &Path) -> Result<(), StorageError> {
        let fs_path = self.resolve(path);
        match fs::remove_dir_all(&fs_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn clone_for_job(&self, backup_root: PathBuf, retention: RetentionPolicy) -> Box<dyn Storage> {
        Box::new(Self {
            backup_root,
            retention,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_domain::placement::relative_target;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalStorage, PathBuf) {
        let mount = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new("disk", mount.path()).unwrap();
        let artifact = mount.path().join("artifact.tar");
        fs::write(&artifact, b"payload").unwrap();
        (mount, storage, artifact)
    }

    #[test]
    fn test_rejects_relative_mount() {
        assert!(LocalStorage::new("disk", "relative/path").is_err());
        assert!(LocalStorage::new("", "/abs").is_err());
    }

    #[test]
    fn test_resolve_strips_root() {
        let storage = LocalStorage::new("disk", "/mnt/b").unwrap();
        assert_eq!(
            storage.resolve(Path::new("/www/db/daily/f.tar")),
            PathBuf::from("/mnt/b/www/db/daily/f.tar")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_deliver_creates_symlinks() {
        let (mount, storage, artifact) = setup();
        let primary = PathBuf::from("/www/db/monthly/artifact.tar");
        let link = PathBuf::from("/www/db/daily/artifact.tar");
        let mut placement = Placement::new();
        placement.claim(primary.clone());
        placement.claim(link.clone());

        storage.deliver(&artifact, &placement).unwrap();

        let link_fs = mount.path().join("www/db/daily/artifact.tar");
        let meta = fs::symlink_metadata(&link_fs).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(fs::read_link(&link_fs).unwrap(), relative_target(&link, &primary));
        assert_eq!(fs::read(&link_fs).unwrap(), b"payload");
    }

    #[cfg(unix)]
    #[test]
    fn test_deliver_replaces_link_without_writing_through() {
        let (mount, storage, artifact) = setup();
        let year = PathBuf::from("/k/2024/inc_meta_info/year.inc");
        let month = PathBuf::from("/k/2024/inc_meta_info/month.inc");

        let mut init = Placement::new();
        init.claim(year.clone());
        init.claim(month.clone());
        storage.deliver(&artifact, &init).unwrap();

        let newer = mount.path().join("newer.inc");
        fs::write(&newer, b"month state").unwrap();
        let mut monthly = Placement::new();
        monthly.claim(month);
        storage.deliver(&newer, &monthly).unwrap();

        let base = mount.path().join("k/2024/inc_meta_info");
        assert_eq!(fs::read(base.join("year.inc")).unwrap(), b"payload");
        assert_eq!(fs::read(base.join("month.inc")).unwrap(), b"month state");
        assert!(!fs::symlink_metadata(base.join("month.inc"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn test_read_file_relative_to_backup_root() {
        let (mount, storage, _artifact) = setup();
        let job = storage.clone_for_job(PathBuf::from("/www"), RetentionPolicy::new(1, 0, 0));
        fs::create_dir_all(mount.path().join("www/k")).unwrap();
        fs::write(mount.path().join("www/k/year.inc"), b"state").unwrap();

        assert_eq!(job.read_file(Path::new("k/year.inc")).unwrap(), b"state");
        let missing = job.read_file(Path::new("k/day.inc")).unwrap_err();
        assert!(missing.is_not_found());
    }

    #[test]
    fn test_listing_missing_dir_is_empty() {
        let (_mount, storage, _artifact) = setup();
        assert!(storage.list_files(Path::new("/nope")).unwrap().is_empty());
        assert!(storage.list_dirs(Path::new("/nope")).unwrap().is_empty());
        assert!(storage.remove_tree(Path::new("/nope")).is_ok());
    }

    #[test]
    fn test_list_dirs_and_files() {
        let (mount, storage, _artifact) = setup();
        fs::create_dir_all(mount.path().join("k/2024/month_01")).unwrap();
        fs::create_dir_all(mount.path().join("k/2023")).unwrap();
        fs::write(mount.path().join("k/notes.txt"), b"x").unwrap();

        assert_eq!(storage.list_dirs(Path::new("/k")).unwrap(), vec!["2023", "2024"]);
        let files = storage.list_files(Path::new("/k")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("/k/notes.txt"));
    }
}
