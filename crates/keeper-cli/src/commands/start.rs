//! Start command implementation.

use crate::archiver::TarArchiver;
use crate::cli::StartArgs;
use crate::config::KeeperConfig;
use crate::error::{CliError, Result};
use crate::lock::RunLock;
use crate::output::Formatter;
use crate::runner::JobRunner;
use keeper_domain::SystemClock;

/// Execute the start command.
///
/// Holds the run lock while the selected jobs run one after another.
pub async fn execute_start(
    args: StartArgs,
    config: &KeeperConfig,
    formatter: &Formatter,
) -> Result<()> {
    let _lock = RunLock::acquire(&config.server.lock_file)?;

    let names = if args.runs_all() { Vec::new() } else { args.jobs };
    if config.jobs.is_empty() {
        println!("{}", formatter.info("No jobs configured"));
        return Ok(());
    }

    let mut runner = JobRunner::new(config.clone(), TarArchiver::new(), SystemClock);
    let reports = runner.run(&names).await?;

    println!("{}", formatter.format_reports(&reports)?);

    let failed = reports.iter().filter(|report| !report.is_success()).count();
    if failed > 0 {
        return Err(CliError::JobsFailed(failed));
    }
    Ok(())
}
