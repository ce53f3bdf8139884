//! Integration tests for the job runner
//!
//! Jobs run against a temp-dir storage with a fake archiver and a frozen
//! clock.

use chrono::NaiveDate;
use keeper_cli::config::{
    JobConfig, JobKind, JobStorageConfig, KeeperConfig, ServerSettings, SourceConfig,
    StorageConfig,
};
use keeper_cli::{CliError, JobRunner};
use keeper_domain::calendar::start_of_day;
use keeper_domain::{ArchiveRequest, Archiver, FixedClock, RetentionPolicy};
use keeper_store::StorageKind;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// Writes a distinct artifact per call and appends to the snapshot like
// tar --listed-incremental does
#[derive(Debug, Clone, Default)]
struct FakeArchiver {
    runs: Arc<AtomicUsize>,
    fail_on: Option<PathBuf>,
}

impl FakeArchiver {
    fn failing_on(path: &str) -> Self {
        Self {
            fail_on: Some(PathBuf::from(path)),
            ..Self::default()
        }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Archiver for FakeArchiver {
    type Error = io::Error;

    fn archive(&self, request: &ArchiveRequest<'_>) -> Result<(), io::Error> {
        if self.fail_on.as_deref() == Some(request.source) {
            return Err(io::Error::new(io::ErrorKind::Other, "tar exploded"));
        }
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        fs::write(
            request.destination,
            format!("{} run {}", request.source.display(), run),
        )?;
        if let Some(snapshot) = request.snapshot {
            let mut state = fs::read(snapshot).unwrap_or_default();
            state.extend_from_slice(format!("run {}\n", run).as_bytes());
            fs::write(snapshot, state)?;
        }
        Ok(())
    }
}

struct Fixture {
    mount: TempDir,
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            mount: tempfile::tempdir().unwrap(),
            tmp: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self, job: JobConfig) -> KeeperConfig {
        KeeperConfig {
            server: ServerSettings {
                tmp_dir: self.tmp.path().join("work"),
                lock_file: self.tmp.path().join("keeper.lock"),
                ..ServerSettings::default()
            },
            storages: vec![StorageConfig {
                name: "disk".to_string(),
                kind: StorageKind::Local,
                path: self.mount.path().to_path_buf(),
            }],
            jobs: vec![job],
        }
    }

    fn on_disk(&self, rel: &str) -> PathBuf {
        self.mount.path().join("backups").join(rel)
    }

    fn runner(
        &self,
        job: JobConfig,
        archiver: FakeArchiver,
        (y, m, d): (i32, u32, u32),
    ) -> JobRunner<FakeArchiver, FixedClock> {
        let config = self.config(job);
        config.validate().unwrap();
        JobRunner::new(config, archiver, FixedClock::on(y, m, d).unwrap())
    }

    fn work_dir_is_empty(&self) -> bool {
        fs::read_dir(self.tmp.path().join("work"))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

fn job(name: &str, kind: JobKind, targets: &[&str], retention: RetentionPolicy) -> JobConfig {
    JobConfig {
        name: name.to_string(),
        kind,
        safety_backup: false,
        sources: vec![SourceConfig {
            name: name.to_string(),
            targets: targets.iter().map(PathBuf::from).collect(),
            excludes: Vec::new(),
            gzip: kind == JobKind::Files,
        }],
        storages: vec![JobStorageConfig {
            storage: "disk".to_string(),
            backup_path: PathBuf::from("/backups"),
            retention,
        }],
    }
}

fn write_aged(path: &Path, content: &[u8], (y, m, d): (i32, u32, u32)) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(start_of_day(NaiveDate::from_ymd_opt(y, m, d).unwrap()))
        .unwrap();
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_full_job_rotates_then_delivers() {
    let fx = Fixture::new();
    let daily = fx.on_disk("etc/etc/daily");
    write_aged(&daily.join("etc_2024-03-01_03-00.tar.gz"), b"old", (2024, 3, 1));
    write_aged(&daily.join("etc_2024-03-10_03-00.tar.gz"), b"recent", (2024, 3, 10));

    let job = job("etc", JobKind::Files, &["/etc"], RetentionPolicy::new(7, 4, 0));
    let archiver = FakeArchiver::default();
    // Wednesday, not a weekly or monthly day
    let mut runner = fx.runner(job, archiver.clone(), (2024, 3, 13));

    let reports = runner.run(&[]).await.unwrap();
    let report = &reports[0];

    assert!(report.is_success(), "{:?}", report.errors);
    assert!(!report.skipped);
    assert_eq!(report.artifacts, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.deleted["daily"], 1);
    assert_eq!(archiver.runs(), 1);

    assert_eq!(
        file_names(&daily),
        vec!["etc_2024-03-10_03-00.tar.gz", "etc_2024-03-13_03-00.tar.gz"]
    );
    assert!(!fx.on_disk("etc/etc/weekly").exists());
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_full_job_skipped_when_no_tier_is_active() {
    let fx = Fixture::new();
    let job = job("etc", JobKind::Files, &["/etc"], RetentionPolicy::new(0, 4, 6));
    let archiver = FakeArchiver::default();
    let mut runner = fx.runner(job, archiver.clone(), (2024, 3, 13));

    let reports = runner.run(&[]).await.unwrap();

    assert!(reports[0].skipped);
    assert!(reports[0].is_success());
    assert_eq!(archiver.runs(), 0);
}

#[tokio::test]
async fn test_safety_count_mode_keeps_exact_count() {
    let fx = Fixture::new();
    let daily = fx.on_disk("etc/etc/daily");
    write_aged(&daily.join("etc_2024-03-11_03-00.tar.gz"), b"a", (2024, 3, 11));
    write_aged(&daily.join("etc_2024-03-12_03-00.tar.gz"), b"b", (2024, 3, 12));

    let mut job = job("etc", JobKind::Files, &["/etc"], RetentionPolicy::counting(2, 0, 0));
    job.safety_backup = true;
    let mut runner = fx.runner(job, FakeArchiver::default(), (2024, 3, 13));

    let reports = runner.run(&[]).await.unwrap();

    assert!(reports[0].is_success(), "{:?}", reports[0].errors);
    assert_eq!(
        file_names(&daily),
        vec!["etc_2024-03-12_03-00.tar.gz", "etc_2024-03-13_03-00.tar.gz"]
    );
}

#[tokio::test]
async fn test_failing_target_does_not_stop_siblings() {
    let fx = Fixture::new();
    let job = job(
        "www",
        JobKind::Files,
        &["/var/www", "/srv/app"],
        RetentionPolicy::new(7, 0, 0),
    );
    let mut runner = fx.runner(job, FakeArchiver::failing_on("/var/www"), (2024, 3, 13));

    let reports = runner.run(&[]).await.unwrap();
    let report = &reports[0];

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("www/var_www"));
    assert_eq!(report.artifacts, 1);
    assert_eq!(report.delivered, 1);
    assert!(fx
        .on_disk("www/srv_app/daily/srv_app_2024-03-13_03-00.tar.gz")
        .exists());
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_rejected() {
    let fx = Fixture::new();
    let job = job("etc", JobKind::Files, &["/etc"], RetentionPolicy::new(7, 0, 0));
    let mut runner = fx.runner(job, FakeArchiver::default(), (2024, 3, 13));

    let err = runner.run(&["db".to_string()]).await.unwrap_err();
    assert!(matches!(err, CliError::InvalidInput(_)));
}

#[tokio::test]
async fn test_decade_days_share_one_seed() {
    let fx = Fixture::new();
    let job = job("www", JobKind::IncFiles, &["/var/www"], RetentionPolicy::new(0, 0, 12));
    let archiver = FakeArchiver::default();
    let day_inc = fx.on_disk("www/var_www/2024/inc_meta_info/day.inc");
    let decade = fx.on_disk("www/var_www/2024/month_05/day_11");

    // No year.inc anywhere: the first run starts the chain
    let mut runner = fx.runner(job.clone(), archiver.clone(), (2024, 5, 11));
    let reports = runner.run(&[]).await.unwrap();
    assert!(reports[0].is_success(), "{:?}", reports[0].errors);
    assert_eq!(reports[0].reinits, 1);
    assert!(fx
        .on_disk("www/var_www/2024/year/var_www_2024-05-11_03-00.tar")
        .exists());
    let baseline = fs::read(&day_inc).unwrap();
    assert_eq!(baseline, b"run 0\n");

    for day in [12, 13, 14] {
        let mut runner = fx.runner(job.clone(), archiver.clone(), (2024, 5, day));
        let reports = runner.run(&[]).await.unwrap();
        assert!(reports[0].is_success(), "{:?}", reports[0].errors);
        assert_eq!(reports[0].reinits, 0);
        assert_eq!(fs::read(&day_inc).unwrap(), baseline, "day {}", day);
    }

    let names = file_names(&decade);
    assert_eq!(
        names,
        vec![
            "var_www_2024-05-11_03-00.tar",
            "var_www_2024-05-12_03-00.tar",
            "var_www_2024-05-13_03-00.tar",
            "var_www_2024-05-14_03-00.tar",
        ]
    );
    let contents: Vec<Vec<u8>> = names[1..]
        .iter()
        .map(|name| fs::read(decade.join(name)).unwrap())
        .collect();
    assert_ne!(contents[0], contents[1]);
    assert_ne!(contents[1], contents[2]);
    assert!(fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_missing_day_seed_fails_only_that_run() {
    let fx = Fixture::new();
    let job = job("www", JobKind::IncFiles, &["/var/www"], RetentionPolicy::new(0, 0, 12));
    let year_inc = fx.on_disk("www/var_www/2024/inc_meta_info/year.inc");
    fs::create_dir_all(year_inc.parent().unwrap()).unwrap();
    fs::write(&year_inc, b"state").unwrap();
    let archiver = FakeArchiver::default();

    let mut runner = fx.runner(job, archiver.clone(), (2024, 5, 14));
    let reports = runner.run(&[]).await.unwrap();

    assert_eq!(reports[0].errors.len(), 1);
    assert!(reports[0].errors[0].contains("www/var_www"));
    assert_eq!(reports[0].artifacts, 0);
    assert_eq!(archiver.runs(), 0);
    assert!(fx.work_dir_is_empty());
}

#[cfg(unix)]
fn is_link(path: &Path) -> bool {
    fs::symlink_metadata(path).unwrap().file_type().is_symlink()
}

#[cfg(unix)]
#[tokio::test]
async fn test_new_year_drops_old_chain_before_delivery() {
    let fx = Fixture::new();
    let job = job("www", JobKind::IncFiles, &["/var/www"], RetentionPolicy::new(0, 0, 12));
    let old = fx.on_disk("www/var_www/2024/month_12/day_21/var_www_2024-12-31_03-00.tar");
    write_aged(&old, b"last year", (2024, 12, 31));
    let year_inc = fx.on_disk("www/var_www/2025/inc_meta_info/year.inc");
    fs::create_dir_all(year_inc.parent().unwrap()).unwrap();
    fs::write(&year_inc, b"readable").unwrap();

    let mut runner = fx.runner(job, FakeArchiver::default(), (2025, 1, 1));
    let reports = runner.run(&[]).await.unwrap();
    let report = &reports[0];

    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.reinits, 1);
    assert_eq!(report.deleted["chain"], 1);
    assert!(!fx.on_disk("www/var_www/2024").exists());

    let year = fx.on_disk("www/var_www/2025/year/var_www_2025-01-01_03-00.tar");
    let monthly = fx.on_disk("www/var_www/2025/month_01/monthly/var_www_2025-01-01_03-00.tar");
    let day = fx.on_disk("www/var_www/2025/month_01/day_01/var_www_2025-01-01_03-00.tar");
    assert!(!is_link(&year));
    assert_eq!(fs::read(&year).unwrap(), b"/var/www run 0");
    for link in [&monthly, &day] {
        assert!(is_link(link));
        assert_eq!(fs::canonicalize(link).unwrap(), fs::canonicalize(&year).unwrap());
    }
    // The chain baseline comes from a fresh snapshot, not the stored one
    assert_eq!(fs::read(&year_inc).unwrap(), b"run 0\n");
    assert!(fx.work_dir_is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_lost_year_meta_restarts_chain_mid_year() {
    let fx = Fixture::new();
    let job = job("www", JobKind::IncFiles, &["/var/www"], RetentionPolicy::new(0, 0, 12));
    let stale = fx.on_disk("www/var_www/2024/month_03/day_01/var_www_2024-03-02_03-00.tar");
    write_aged(&stale, b"orphan", (2024, 3, 2));

    let mut runner = fx.runner(job, FakeArchiver::default(), (2024, 5, 14));
    let reports = runner.run(&[]).await.unwrap();
    let report = &reports[0];

    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.reinits, 1);
    assert_eq!(report.deleted["chain"], 1);
    assert!(!fx.on_disk("www/var_www/2024/month_03").exists());

    let year = fx.on_disk("www/var_www/2024/year/var_www_2024-05-14_03-00.tar");
    let day = fx.on_disk("www/var_www/2024/month_05/day_11/var_www_2024-05-14_03-00.tar");
    assert!(!is_link(&year));
    assert!(is_link(&day));
    assert_eq!(fs::canonicalize(&day).unwrap(), fs::canonicalize(&year).unwrap());
    assert_eq!(
        fs::read(fx.on_disk("www/var_www/2024/inc_meta_info/year.inc")).unwrap(),
        b"run 0\n"
    );
}
