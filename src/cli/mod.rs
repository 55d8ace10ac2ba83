//! Command-line interface for appup.
//!
//! # Available Commands
//!
//! - `update` - download (or resume) the latest build and install it
//! - `check` - report whether the cached download is current
//! - `restore` - restore the latest user-data backup
//! - `doctor` - run the host self-check
//! - `clean` - remove the cached download
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: no status lines, warnings and errors only
//! - `--no-progress`: no progress bars
//! - `--config <path>`: configuration file to use
//!
//! ```bash
//! appup update
//! appup --quiet --no-progress update --no-backup
//! appup check --url https://downloads.example.com/app.deb
//! ```

mod check;
mod clean;
mod doctor;
mod restore;
mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::AppupConfig;
use crate::utils::progress::NO_PROGRESS_ENV;

/// Settings shared by every subcommand, derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Suppress status lines
    pub quiet: bool,
    /// Draw progress bars
    pub show_progress: bool,
}

/// Resumable download-and-install updater.
#[derive(Parser)]
#[command(
    name = "appup",
    about = "Download, verify and install the latest build of an application",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "APPUP_CONFIG")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download (resuming if possible), verify and install the latest build
    Update(update::UpdateCommand),

    /// Check whether the cached download is up to date
    Check(check::CheckCommand),

    /// Restore the most recent user-data backup
    Restore(restore::RestoreCommand),

    /// Check that this host can run an update
    Doctor(doctor::DoctorCommand),

    /// Remove the cached download and its metadata
    Clean(clean::CleanCommand),
}

impl Cli {
    /// Build the shared settings from the global flags and the loaded
    /// configuration.
    pub fn build_config(&self, config: &AppupConfig) -> CliConfig {
        let log_level = if self.verbose || config.debug {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };
        CliConfig {
            log_level: log_level.to_string(),
            quiet: self.quiet,
            show_progress: !self.no_progress && !self.quiet && std::env::var_os(NO_PROGRESS_ENV).is_none(),
        }
    }

    /// Load configuration, set up logging and run the subcommand.
    pub async fn execute(self) -> Result<()> {
        let config = AppupConfig::load(self.config.as_deref())?;
        let cli_config = self.build_config(&config);
        init_logging(&cli_config.log_level);
        self.execute_with_config(config, cli_config).await
    }

    /// Run the subcommand with explicit settings.
    pub async fn execute_with_config(self, config: AppupConfig, cli: CliConfig) -> Result<()> {
        match self.command {
            Commands::Update(cmd) => cmd.execute(config, &cli).await,
            Commands::Check(cmd) => cmd.execute(config, &cli).await,
            Commands::Restore(cmd) => cmd.execute(config, &cli).await,
            Commands::Doctor(cmd) => cmd.execute(config, &cli).await,
            Commands::Clean(cmd) => cmd.execute(config, &cli).await,
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,appup_cli={default_level},appup={default_level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
