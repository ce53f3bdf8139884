//! Jobs command implementation.

use crate::config::KeeperConfig;
use crate::error::Result;
use crate::output::Formatter;

/// Execute the jobs command.
pub async fn execute_jobs(config: &KeeperConfig, formatter: &Formatter) -> Result<()> {
    println!("{}", formatter.format_jobs(&config.jobs)?);
    Ok(())
}
