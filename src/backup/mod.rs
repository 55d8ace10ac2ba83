//! External backup utility.
//!
//! The utility protects the application's user data across an upgrade. It is
//! invoked with no arguments to take a backup and with `--restore --yes` to
//! restore the most recent one. Its contents and storage format are its own
//! business; appup only looks at the exit status.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::constants::BACKUP_RESTORE_ARGS;
use crate::core::AppupError;
use crate::utils::process::{CommandRunner, CommandSpec};

/// Runs the configured backup utility.
pub struct BackupManager<R> {
    command: Option<PathBuf>,
    runner: R,
}

impl<R: CommandRunner> BackupManager<R> {
    /// Create a manager. `command` of `None` means no utility is configured.
    pub fn new(command: Option<PathBuf>, runner: R) -> Self {
        Self {
            command,
            runner,
        }
    }

    /// Command line that takes a backup.
    pub fn create_command(&self) -> Option<CommandSpec> {
        self.command.as_deref().map(|cmd| CommandSpec::new(cmd.display().to_string()))
    }

    /// Command line that restores the latest backup.
    pub fn restore_command(&self) -> Option<CommandSpec> {
        self.create_command().map(|cmd| cmd.args(BACKUP_RESTORE_ARGS))
    }

    /// Take a backup. Returns `false` when no utility is configured.
    ///
    /// # Errors
    ///
    /// [`AppupError::BackupFailed`] when the utility cannot start or exits
    /// non-zero.
    pub async fn create(&self) -> Result<bool, AppupError> {
        let Some(command) = self.create_command() else {
            debug!("No backup utility configured, skipping backup");
            return Ok(false);
        };
        self.run(&command).await?;
        info!("Backup created with {}", command);
        Ok(true)
    }

    /// Restore the latest backup.
    ///
    /// # Errors
    ///
    /// [`AppupError::BackupFailed`] when no utility is configured, it cannot
    /// start, or it exits non-zero.
    pub async fn restore(&self) -> Result<(), AppupError> {
        let command = self.restore_command().ok_or_else(|| AppupError::BackupFailed {
            command: "restore".to_string(),
            reason: "no backup utility configured (set APPUP_BACKUP_COMMAND)".to_string(),
        })?;
        self.run(&command).await?;
        info!("Backup restored with {}", command);
        Ok(())
    }

    async fn run(&self, command: &CommandSpec) -> Result<(), AppupError> {
        let outcome = self.runner.run(command).await.map_err(|e| AppupError::BackupFailed {
            command: command.to_string(),
            reason: format!("{e:#}"),
        })?;
        if outcome.success() {
            Ok(())
        } else {
            Err(AppupError::BackupFailed {
                command: command.to_string(),
                reason: outcome.describe(),
            })
        }
    }
}
