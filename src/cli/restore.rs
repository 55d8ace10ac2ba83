//! `appup restore`

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use crate::backup::BackupManager;
use crate::config::AppupConfig;
use crate::lock::InstanceLock;
use crate::registry::{CleanupScope, ResourceRegistry};
use crate::utils::process::SystemRunner;

/// Restore the most recent user-data backup.
#[derive(Args, Debug)]
pub struct RestoreCommand {}

impl RestoreCommand {
    pub async fn execute(self, config: AppupConfig, cli: &CliConfig) -> Result<()> {
        let registry = ResourceRegistry::new(config.cleanup_policy());
        let scope = CleanupScope::enter(registry.clone());

        scope
            .run(async {
                let _lock = InstanceLock::acquire(&config.lock_path(), &registry)?;
                let backup = BackupManager::new(config.backup_command.clone(), SystemRunner::new(registry.clone()));
                backup.restore().await?;
                Ok(())
            })
            .await?;

        if !cli.quiet {
            println!("{}", "Backup restored".green().bold());
        }
        Ok(())
    }
}
