//! `appup doctor`

use anyhow::Result;
use clap::Args;

use super::CliConfig;
use crate::config::AppupConfig;
use crate::doctor::{print_report, run_self_check};
use crate::registry::{CleanupScope, ResourceRegistry};

/// Check that this host can run an update.
#[derive(Args, Debug)]
pub struct DoctorCommand {}

impl DoctorCommand {
    pub async fn execute(self, config: AppupConfig, cli: &CliConfig) -> Result<()> {
        let registry = ResourceRegistry::new(config.cleanup_policy());
        let scope = CleanupScope::enter(registry.clone());
        let quiet = cli.quiet;

        scope
            .run(async {
                let results = run_self_check(&config, &registry);
                let failed: Vec<_> = results.iter().filter(|r| !r.passed).collect();
                if !quiet || !failed.is_empty() {
                    print_report(&results);
                }
                if !failed.is_empty() {
                    anyhow::bail!("{} self-check(s) failed", failed.len());
                }
                Ok(())
            })
            .await
    }
}
