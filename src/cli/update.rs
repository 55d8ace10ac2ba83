//! `appup update`

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use crate::config::AppupConfig;
use crate::installer::resolve_family;
use crate::pipeline::{Pipeline, PipelineOutcome, RunOptions};
use crate::registry::{CleanupScope, ResourceRegistry};
use crate::utils::process::SystemRunner;

/// Download, verify and install the latest build.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Discard the cached download and fetch from scratch
    #[arg(long)]
    force: bool,

    /// Do not run the backup utility before installing
    #[arg(long)]
    no_backup: bool,

    /// Download from this URL instead of the configured one
    #[arg(long)]
    url: Option<String>,
}

impl UpdateCommand {
    pub async fn execute(self, config: AppupConfig, cli: &CliConfig) -> Result<()> {
        let registry = ResourceRegistry::new(config.cleanup_policy());
        let scope = CleanupScope::enter(registry.clone());

        let options = RunOptions {
            force: self.force,
            skip_backup: self.no_backup,
            quiet: cli.quiet,
            show_progress: cli.show_progress,
            url: self.url,
            self_check: config.self_check,
        };

        let outcome = scope
            .run(async {
                let family = resolve_family(config.package_family)?;
                let resolver = config.metadata_resolver()?;
                let runner = SystemRunner::new(registry.clone());
                let pipeline = Pipeline::new(config.clone(), family, registry.clone(), resolver, runner);
                pipeline.run(&options).await
            })
            .await?;

        if !cli.quiet {
            let PipelineOutcome::Installed {
                downloaded,
                attempts,
                install,
            } = outcome;
            let how = match (downloaded, install.repaired) {
                (false, _) => "from cache".to_string(),
                (true, false) => format!("after {attempts} download attempt(s)"),
                (true, true) => format!("after {attempts} download attempt(s) and a dependency repair"),
            };
            println!("\n{} {}", "Update complete".green().bold(), how);
        }
        Ok(())
    }
}
