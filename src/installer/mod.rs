//! Native package installation.
//!
//! The installer hands a verified artifact to the host package manager. A
//! failed install gets at most one recovery pass, and only for families whose
//! install step leaves dependencies unresolved:
//!
//! ```text
//! install ──ok──▶ done
//!    │
//!  fail ──(apt)──▶ repair ──▶ install ──ok──▶ done
//!    │                           │
//!    └──(rpm families)──▶ InstallFailed ◀──fail
//! ```
//!
//! There is no retry loop beyond that: reinstalling the same broken package
//! does not fix it.

pub mod detect;
pub mod family;

pub use detect::{command_exists, detect_family, resolve_family};
pub use family::{PackageFamily, PackageFormat};

use std::path::Path;
use tracing::{debug, info, warn};

use crate::core::AppupError;
use crate::utils::process::{CommandOutcome, CommandRunner, CommandSpec};

/// What happened during a successful install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    /// Number of install invocations (1 or 2)
    pub install_attempts: u32,
    /// Whether the dependency-repair pass ran
    pub repaired: bool,
}

/// Installs artifacts for one package family.
pub struct Installer<R> {
    family: PackageFamily,
    elevate: bool,
    runner: R,
}

impl<R: CommandRunner> Installer<R> {
    /// Create an installer. `elevate` prefixes commands with `sudo`.
    pub fn new(family: PackageFamily, elevate: bool, runner: R) -> Self {
        Self {
            family,
            elevate,
            runner,
        }
    }

    /// Install the package at `path`.
    ///
    /// # Errors
    ///
    /// [`AppupError::InstallFailed`] when the install command fails and either
    /// the family has no repair pass or the single re-attempt fails too.
    pub async fn install(&self, path: &Path) -> Result<InstallReport, AppupError> {
        let install = self.family.install_command(path).elevated(self.elevate);

        let outcome = self.run(&install).await?;
        if outcome.success() {
            info!("Installed {}", path.display());
            return Ok(InstallReport {
                install_attempts: 1,
                repaired: false,
            });
        }

        let Some(repair) = self.family.repair_command() else {
            return Err(install_failed(&install, &outcome));
        };
        let repair = repair.elevated(self.elevate);

        warn!("`{}` failed ({}), repairing dependencies", install, outcome.describe());
        let repair_outcome = self.run(&repair).await?;
        if !repair_outcome.success() {
            warn!("`{}` failed ({}), retrying install anyway", repair, repair_outcome.describe());
        }

        let retry = self.run(&install).await?;
        if retry.success() {
            info!("Installed {} after dependency repair", path.display());
            Ok(InstallReport {
                install_attempts: 2,
                repaired: true,
            })
        } else {
            Err(install_failed(&install, &retry))
        }
    }

    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome, AppupError> {
        debug!("Running {}", command);
        self.runner.run(command).await.map_err(|e| AppupError::InstallFailed {
            command: command.to_string(),
            reason: format!("{e:#}"),
        })
    }
}

fn install_failed(command: &CommandSpec, outcome: &CommandOutcome) -> AppupError {
    AppupError::InstallFailed {
        command: command.to_string(),
        reason: outcome.describe(),
    }
}
