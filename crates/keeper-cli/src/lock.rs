//! Process-wide run lock
//!
//! Two overlapping `keeper start` invocations would race on the same
//! incremental chains, so a run holds an exclusive advisory lock for its
//! whole duration.

use crate::error::{CliError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusive lock held for the duration of a run
///
/// The lock file carries the holder's PID and is removed on drop.
pub struct RunLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: LockedFile,
}

impl RunLock {
    /// Acquire the lock without blocking
    ///
    /// # Errors
    /// Returns [`CliError::Lock`] if another process holds the lock
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        let mut file = match try_lock_exclusive(file)? {
            Some(locked) => locked,
            None => {
                return Err(CliError::Lock(format!(
                    "another keeper run holds {}",
                    path.display()
                )))
            }
        };

        write_pid(&mut file)?;
        tracing::debug!("Acquired run lock {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
type LockedFile = nix::fcntl::Flock<File>;

#[cfg(not(unix))]
type LockedFile = File;

#[cfg(unix)]
fn try_lock_exclusive(file: File) -> Result<Option<LockedFile>> {
    use nix::fcntl::{Flock, FlockArg};

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(locked) => Ok(Some(locked)),
        Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
        Err((_, errno)) => Err(CliError::Io(std::io::Error::from(errno))),
    }
}

// Advisory locking is unix-only; elsewhere the lock file is informational.
#[cfg(not(unix))]
fn try_lock_exclusive(file: File) -> Result<Option<LockedFile>> {
    Ok(Some(file))
}

fn write_pid(file: &mut File) -> Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.sync_all()?;
    Ok(())
}
