//! GNU tar archiver
//!
//! Produces full and `--listed-incremental` archives by running the system
//! `tar`. Tar reports some harmless conditions with exit status 1; those
//! are recognised by their stderr lines and not treated as failures.

use keeper_domain::{ArchiveRequest, Archiver};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

/// Stderr fragments tar emits for conditions that leave a usable archive
pub const BENIGN_WARNINGS: &[&str] = &[
    "file changed as we read it",
    "socket ignored",
    "file removed before we read it",
    "Removing leading",
];

/// Errors produced by the tar archiver
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// tar could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// tar exited with a failure
    #[error("{program} exited with {status} for {}: {stderr}", .source_path.display())]
    Failed {
        /// Program that failed
        program: String,
        /// Path being archived
        source_path: PathBuf,
        /// Exit status description
        status: String,
        /// Captured stderr
        stderr: String,
    },
}

/// Archiver running GNU tar
#[derive(Debug, Clone)]
pub struct TarArchiver {
    program: String,
}

impl TarArchiver {
    /// Archiver using `tar` from `PATH`
    pub fn new() -> Self {
        Self::with_program("tar")
    }

    /// Archiver using a specific tar binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments of one tar invocation
    pub fn args(request: &ArchiveRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--create".into()];
        if request.gzip {
            args.push("--gzip".into());
        }
        if let Some(snapshot) = request.snapshot {
            let mut arg = OsString::from("--listed-incremental=");
            arg.push(snapshot);
            args.push(arg);
        }
        for pattern in request.excludes {
            args.push(format!("--exclude={}", pattern).into());
        }
        args.push("--file".into());
        args.push(request.destination.into());
        args.push(request.source.into());
        args
    }
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for TarArchiver {
    type Error = ArchiveError;

    fn archive(&self, request: &ArchiveRequest<'_>) -> Result<(), Self::Error> {
        tracing::debug!(
            "Archiving {} to {}",
            request.source.display(),
            request.destination.display()
        );

        let output = Command::new(&self.program)
            .args(Self::args(request))
            .output()
            .map_err(|source| ArchiveError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let benign = output.status.code() == Some(1) && only_benign_warnings(&stderr);

        if output.status.success() || benign {
            for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
                tracing::warn!("{}: {}", self.program, line);
            }
            return Ok(());
        }

        Err(ArchiveError::Failed {
            program: self.program.clone(),
            source_path: request.source.to_path_buf(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Whether every non-empty stderr line is a known harmless warning
///
/// The trailing "Exiting with failure status" summary tar prints after
/// warnings is ignored.
pub fn only_benign_warnings(stderr: &str) -> bool {
    let mut saw_warning = false;
    for line in stderr.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if line.contains("Exiting with failure status due to previous errors") {
            continue;
        }
        if !BENIGN_WARNINGS.iter().any(|warning| line.contains(warning)) {
            return false;
        }
        saw_warning = true;
    }
    saw_warning
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_args_full() {
        let excludes = vec!["*.log".to_string()];
        let request = ArchiveRequest {
            source: Path::new("/etc"),
            destination: Path::new("/tmp/run/etc.tar.gz"),
            excludes: &excludes,
            gzip: true,
            snapshot: None,
        };

        let args = TarArchiver::args(&request);
        assert_eq!(
            args,
            vec![
                OsString::from("--create"),
                OsString::from("--gzip"),
                OsString::from("--exclude=*.log"),
                OsString::from("--file"),
                OsString::from("/tmp/run/etc.tar.gz"),
                OsString::from("/etc"),
            ]
        );
    }

    #[test]
    fn test_args_incremental() {
        let request = ArchiveRequest {
            source: Path::new("/var/www"),
            destination: Path::new("/tmp/run/var_www.tar"),
            excludes: &[],
            gzip: false,
            snapshot: Some(Path::new("/tmp/run/var_www.inc")),
        };

        let args = TarArchiver::args(&request);
        assert!(args.contains(&OsString::from("--listed-incremental=/tmp/run/var_www.inc")));
        assert!(!args.contains(&OsString::from("--gzip")));
    }

    #[test]
    fn test_benign_warnings() {
        let stderr = "tar: /var/www/app.log: file changed as we read it\n\
                      tar: Exiting with failure status due to previous errors\n";
        assert!(only_benign_warnings(stderr));

        let stderr = "tar: Removing leading `/' from member names\n\
                      tar: /var/run/app.sock: socket ignored\n";
        assert!(only_benign_warnings(stderr));
    }

    #[test]
    fn test_fatal_warnings() {
        let stderr = "tar: /root/secret: Cannot open: Permission denied\n\
                      tar: Exiting with failure status due to previous errors\n";
        assert!(!only_benign_warnings(stderr));

        assert!(!only_benign_warnings(""));
    }

    #[test]
    fn test_missing_program() {
        let archiver = TarArchiver::with_program("keeper-test-no-such-tar");
        let request = ArchiveRequest {
            source: Path::new("/etc"),
            destination: Path::new("/tmp/none.tar"),
            excludes: &[],
            gzip: false,
            snapshot: None,
        };

        let err = archiver.archive(&request).unwrap_err();
        assert!(matches!(err, ArchiveError::Spawn { .. }));
    }
}
