//! The update pipeline.
//!
//! ```text
//! lock ─▶ staleness check ─▶ [skip | fetch with resume] ─▶ verify ─▶ backup ─▶ install
//! ```
//!
//! Every stage prints one status line. Any failure aborts the run and
//! propagates to the caller, which reconciles the [`ResourceRegistry`] through
//! a [`CleanupScope`](crate::registry::CleanupScope). The pipeline itself never
//! releases the lock or removes partial downloads.

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, info};

use crate::backup::BackupManager;
use crate::config::AppupConfig;
use crate::core::AppupError;
use crate::doctor::{all_passed, print_report, run_self_check};
use crate::download::{
    ArtifactVerifier, CachedArtifact, DownloadDecision, MetadataResolver, RemoteMetadata,
    ResumableFetcher, needs_download,
};
use crate::installer::{InstallReport, Installer, PackageFamily};
use crate::lock::InstanceLock;
use crate::registry::ResourceRegistry;
use crate::utils::fs::{ensure_dir, remove_if_exists};
use crate::utils::process::{CommandRunner, is_root};
use crate::utils::progress::ProgressBar;

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Discard the cache and download fresh
    pub force: bool,
    /// Do not run the backup utility
    pub skip_backup: bool,
    /// Suppress status lines
    pub quiet: bool,
    /// Draw a download progress bar
    pub show_progress: bool,
    /// Use this URL instead of the configured one
    pub url: Option<String>,
    /// Run the host self-check once the lock is held
    pub self_check: bool,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The artifact was installed.
    Installed {
        /// Whether any bytes were fetched
        downloaded: bool,
        /// Download attempts used (0 when the cache was current)
        attempts: u32,
        /// Installer details
        install: InstallReport,
    },
}

/// Runs the update pipeline for one package family.
pub struct Pipeline<R, M> {
    config: AppupConfig,
    family: PackageFamily,
    registry: ResourceRegistry,
    resolver: M,
    runner: R,
}

impl<R, M> Pipeline<R, M>
where
    R: CommandRunner + Clone,
    M: MetadataResolver,
{
    /// Create a pipeline.
    pub fn new(
        config: AppupConfig,
        family: PackageFamily,
        registry: ResourceRegistry,
        resolver: M,
        runner: R,
    ) -> Self {
        Self {
            config,
            family,
            registry,
            resolver,
            runner,
        }
    }

    /// The cached artifact for this family.
    pub fn artifact(&self) -> CachedArtifact {
        CachedArtifact::in_dir(
            &self.config.download_dir,
            &self.config.app.name,
            self.family.format().extension(),
        )
    }

    /// Download URL: the override, else the configured URL for this family.
    pub fn url(&self, url_override: Option<&str>) -> Result<String, AppupError> {
        url_override
            .or_else(|| self.config.artifact_url(self.family.format()))
            .map(str::to_string)
            .ok_or_else(|| AppupError::ConfigError {
                message: format!(
                    "no download URL configured for {} packages (set APPUP_{}_URL or pass --url)",
                    self.family.format(),
                    self.family.format().extension().to_uppercase()
                ),
            })
    }

    /// Acquire the instance lock.
    pub fn lock(&self, options: &RunOptions) -> Result<InstanceLock, AppupError> {
        let lock = InstanceLock::acquire(&self.config.lock_path(), &self.registry)?;
        status(options, "🔒", &format!("Acquired lock {}", lock.path().display()));
        Ok(lock)
    }

    /// Evaluate the cache without fetching anything.
    pub async fn check(&self, url_override: Option<&str>) -> Result<DownloadDecision> {
        let url = self.url(url_override)?;
        needs_download(&self.artifact(), &url, &self.resolver).await
    }

    /// Run the full pipeline.
    pub async fn run(&self, options: &RunOptions) -> Result<PipelineOutcome> {
        let url = self.url(options.url.as_deref())?;
        let _lock = self.lock(options)?;

        if options.self_check {
            let results = run_self_check(&self.config, &self.registry);
            if !all_passed(&results) {
                print_report(&results);
                return Err(AppupError::ConfigError {
                    message: "self-check failed, not updating".to_string(),
                }
                .into());
            }
        }

        ensure_dir(&self.config.download_dir)?;
        let artifact = self.artifact();
        self.registry.track_artifact(&artifact.path, self.config.partial_threshold);

        if options.force {
            info!("Discarding cached download");
            remove_if_exists(&artifact.path)?;
            remove_if_exists(&artifact.metadata_path)?;
        }

        status(options, "🔍", "Checking for updates");
        let decision = needs_download(&artifact, &url, &self.resolver).await?;
        debug!("Download decision: {:?}", decision);
        status(options, "  ", &decision.to_string());

        let (expected_size, fetch) = self.plan(&artifact, &url, decision).await?;

        let mut attempts = 0;
        if let Some(offset) = fetch {
            if offset > 0 {
                status(options, "📥", &format!("Resuming download at byte {offset} of {expected_size}"));
            } else {
                status(options, "📥", &format!("Downloading {expected_size} bytes"));
            }
            let fetcher = ResumableFetcher::new(self.config.fetch_options(options.show_progress))?;
            let report = fetcher.fetch(&url, &artifact.path, Some(offset), expected_size).await?;
            attempts = report.attempts;
        }

        ArtifactVerifier::verify(&artifact.path, self.family.format(), expected_size)?;
        status(options, "✅", &format!("Verified {} ({} bytes)", artifact.path.display(), expected_size));

        if options.skip_backup {
            status(options, "⚠️ ", "Skipping backup");
        } else {
            let backup = BackupManager::new(self.config.backup_command.clone(), self.runner.clone());
            if backup.create().await? {
                status(options, "💾", "Backup created");
            }
        }

        status(options, "📦", &format!("Installing with {}", self.family));
        let elevate = self.config.use_sudo && !is_root();
        let installer = Installer::new(self.family, elevate, self.runner.clone());
        let spinner = ProgressBar::spinner(format!("{} is running", self.family), options.show_progress);
        let install = installer.install(&artifact.path).await;
        spinner.finish_and_clear();
        let install = install?;
        status(options, "✅", "Installed");

        Ok(PipelineOutcome::Installed {
            downloaded: fetch.is_some(),
            attempts,
            install,
        })
    }

    /// Expected size and, when a fetch is needed, its start offset.
    ///
    /// Fresh metadata is saved before fetching so an interrupted download can
    /// be resumed by the next run.
    async fn plan(
        &self,
        artifact: &CachedArtifact,
        url: &str,
        decision: DownloadDecision,
    ) -> Result<(u64, Option<u64>)> {
        match decision {
            DownloadDecision::UpToDate => {
                let saved = artifact
                    .saved_metadata()
                    .await?
                    .context("Cached download lost its metadata")?;
                Ok((saved.content_length, None))
            }
            DownloadDecision::Incomplete {
                offset,
                expected,
            } => Ok((expected, Some(offset))),
            DownloadDecision::RemoteChanged {
                offset,
                fresh,
            } => {
                self.save_metadata(artifact, &fresh).await?;
                Ok((fresh.content_length, Some(offset)))
            }
            DownloadDecision::NoCachedFile
            | DownloadDecision::NoSavedMetadata
            | DownloadDecision::Oversized { .. } => {
                let fresh = self.resolver.resolve(url).await?;
                self.save_metadata(artifact, &fresh).await?;
                Ok((fresh.content_length, Some(0)))
            }
        }
    }

    async fn save_metadata(&self, artifact: &CachedArtifact, fresh: &RemoteMetadata) -> Result<()> {
        if fresh.content_length == 0 {
            return Err(AppupError::NetworkError {
                operation: "HEAD".to_string(),
                reason: "the server did not report the artifact size".to_string(),
            }
            .into());
        }
        fresh.save(&artifact.metadata_path, &self.registry).await
    }
}

/// Remove the cached artifact and its sidecar. Returns the number of files
/// removed.
pub fn clean_cache(artifact: &CachedArtifact) -> Result<usize> {
    let mut removed = 0;
    for path in [&artifact.path, &artifact.metadata_path] {
        if remove_if_exists(path)? {
            removed += 1;
        }
    }
    Ok(removed)
}

fn status(options: &RunOptions, icon: &str, message: &str) {
    if !options.quiet {
        println!("{} {}", icon, message.bold());
    }
}
