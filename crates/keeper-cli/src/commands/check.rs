//! Check command implementation.

use crate::config::KeeperConfig;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use keeper_store::open_storage;

/// Execute the check command.
///
/// The configuration was validated when loaded; this opens every storage.
pub async fn execute_check(config: &KeeperConfig, formatter: &Formatter) -> Result<()> {
    println!(
        "{}",
        formatter.success(&format!(
            "Configuration valid: {} storage(s), {} job(s)",
            config.storages.len(),
            config.jobs.len()
        ))
    );

    let mut unavailable = Vec::new();
    for storage in &config.storages {
        match open_storage(storage.kind, &storage.name, &storage.path) {
            Ok(_) => println!(
                "{}",
                formatter.success(&format!(
                    "Storage '{}' ({}) at {}",
                    storage.name,
                    storage.kind,
                    storage.path.display()
                ))
            ),
            Err(e) => {
                println!(
                    "{}",
                    formatter.error(&format!("Storage '{}': {}", storage.name, e))
                );
                unavailable.push(storage.name.clone());
            }
        }
    }

    if !unavailable.is_empty() {
        return Err(CliError::Config(format!(
            "unavailable storage(s): {}",
            unavailable.join(", ")
        )));
    }
    Ok(())
}
