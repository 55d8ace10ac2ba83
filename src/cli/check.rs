//! `appup check`

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use crate::config::AppupConfig;
use crate::download::DownloadDecision;
use crate::installer::resolve_family;
use crate::pipeline::Pipeline;
use crate::registry::ResourceRegistry;
use crate::utils::process::SystemRunner;

/// Report whether a download is needed, without fetching or installing.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Check this URL instead of the configured one
    #[arg(long)]
    url: Option<String>,
}

impl CheckCommand {
    pub async fn execute(self, config: AppupConfig, cli: &CliConfig) -> Result<()> {
        let family = resolve_family(config.package_family)?;
        let resolver = config.metadata_resolver()?;
        let registry = ResourceRegistry::default();
        let runner = SystemRunner::new(registry.clone());
        let pipeline = Pipeline::new(config, family, registry, resolver, runner);

        let artifact = pipeline.artifact();
        let decision = pipeline.check(self.url.as_deref()).await?;

        if !cli.quiet {
            println!("{} {}", "Artifact:".bold(), artifact.path.display());
            let line = decision.to_string();
            match decision {
                DownloadDecision::UpToDate => println!("✅ {}", line.green()),
                DownloadDecision::Incomplete { .. } => println!("⏸️  {} (will resume)", line.yellow()),
                _ => println!("📥 {} (download required)", line.yellow()),
            }
        }
        Ok(())
    }
}
