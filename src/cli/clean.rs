//! `appup clean`

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use crate::config::AppupConfig;
use crate::download::CachedArtifact;
use crate::installer::PackageFormat;
use crate::lock::InstanceLock;
use crate::pipeline::clean_cache;
use crate::registry::{CleanupScope, ResourceRegistry};

/// Remove the cached download and its metadata.
#[derive(Args, Debug)]
pub struct CleanCommand {}

impl CleanCommand {
    pub async fn execute(self, config: AppupConfig, cli: &CliConfig) -> Result<()> {
        let registry = ResourceRegistry::new(config.cleanup_policy());
        let scope = CleanupScope::enter(registry.clone());

        let removed = scope
            .run(async {
                let _lock = InstanceLock::acquire(&config.lock_path(), &registry)?;
                let mut removed = 0;
                for format in [PackageFormat::Deb, PackageFormat::Rpm] {
                    let artifact =
                        CachedArtifact::in_dir(&config.download_dir, &config.app.name, format.extension());
                    removed += clean_cache(&artifact)?;
                }
                Ok(removed)
            })
            .await?;

        if !cli.quiet {
            if removed == 0 {
                println!("{}", "Nothing to clean".yellow());
            } else {
                println!("{} {} file(s) from {}", "Removed".green().bold(), removed, config.download_dir.display());
            }
        }
        Ok(())
    }
}
