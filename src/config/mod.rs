//! Configuration for appup.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. built-in defaults
//! 2. a TOML file: `--config <path>`, else `$APPUP_CONFIG`, else
//!    `<config dir>/appup/config.toml` (a missing file means defaults)
//! 3. `APPUP_*` environment variables
//!
//! # Example
//!
//! ```toml
//! download_dir = "~/.cache/appup/downloads"
//! max_attempts = 5
//! backup_command = "/usr/local/bin/app-backup"
//! package_family = "apt"
//!
//! [app]
//! name = "app"
//! deb_url = "https://downloads.example.com/latest/app.deb"
//! rpm_url = "https://downloads.example.com/latest/app.rpm"
//! ```

mod parser;

pub use parser::{parse_bool, parse_config, parse_number};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_GRACE_PERIOD_SECS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_METADATA_TIMEOUT_SECS, DEFAULT_PARTIAL_THRESHOLD,
    DEFAULT_RETRY_DELAY_SECS,
};
use crate::core::AppupError;
use crate::download::{FetchOptions, HttpMetadataResolver};
use crate::installer::{PackageFamily, PackageFormat};
use crate::lock::InstanceLock;
use crate::registry::{CleanupPolicy, default_allowed_prefixes};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "APPUP_CONFIG";

/// The application being kept up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Used for the cached artifact file name
    pub name: String,
    /// Download URL of the `.deb` build
    pub deb_url: Option<String>,
    /// Download URL of the `.rpm` build
    pub rpm_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            deb_url: None,
            rpm_url: None,
        }
    }
}

/// Effective appup settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppupConfig {
    /// Where the artifact and its metadata sidecar are cached
    pub download_dir: PathBuf,
    /// Partial downloads below this many bytes are discarded on failure
    pub partial_threshold: u64,
    /// Seconds between SIGTERM and SIGKILL for tracked processes
    pub grace_period: u64,
    /// Seconds allowed for one download attempt
    pub download_timeout: u64,
    /// Seconds allowed for establishing a connection
    pub connect_timeout: u64,
    /// Seconds allowed for the metadata `HEAD` request
    pub metadata_timeout: u64,
    /// Download attempts, including the first
    pub max_attempts: u32,
    /// Seconds between download attempts
    pub retry_delay: u64,
    /// Debug logging
    pub debug: bool,
    /// Run the self-check before every update
    pub self_check: bool,
    /// Override for the instance lock file
    pub lock_path: Option<PathBuf>,
    /// External backup utility
    pub backup_command: Option<PathBuf>,
    /// Override for package family detection
    pub package_family: Option<PackageFamily>,
    /// Prefix package manager commands with `sudo` when not root
    pub use_sudo: bool,
    /// Application settings
    pub app: AppConfig,
}

impl Default for AppupConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            partial_threshold: DEFAULT_PARTIAL_THRESHOLD,
            grace_period: DEFAULT_GRACE_PERIOD_SECS,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            debug: false,
            self_check: false,
            lock_path: None,
            backup_command: None,
            package_family: None,
            use_sudo: true,
            app: AppConfig::default(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("appup").join("downloads")
}

impl AppupConfig {
    /// Default config file location: `<config dir>/appup/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("appup").join("config.toml"))
    }

    /// Load from the file layer and the process environment.
    ///
    /// # Errors
    ///
    /// Fails when an explicitly named file is missing, a file is not valid
    /// TOML, or an environment value is invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with_env(explicit, &|key| std::env::var(key).ok())
    }

    /// [`AppupConfig::load`] with an injectable environment lookup.
    pub fn load_with_env(explicit: Option<&Path>, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let named = explicit.map(Path::to_path_buf).or_else(|| env(CONFIG_ENV).map(PathBuf::from));

        let mut config = match named {
            Some(path) => {
                let path = expand_path(&path);
                if !path.exists() {
                    return Err(AppupError::ConfigError {
                        message: format!("config file {} does not exist", path.display()),
                    }
                    .into());
                }
                Self::load_from(&path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(env)?;
        config.normalize();
        Ok(config)
    }

    /// Load the file at `path` without applying the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let mut config: Self = parse_config(path)?;
        config.normalize();
        Ok(config)
    }

    /// Apply `APPUP_*` overrides from `env`.
    ///
    /// # Errors
    ///
    /// [`AppupError::ConfigError`] for values that do not parse.
    pub fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<(), AppupError> {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("APPUP_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(v);
        }
        if let Some(v) = get("APPUP_PARTIAL_THRESHOLD") {
            self.partial_threshold = parse_number("APPUP_PARTIAL_THRESHOLD", &v)?;
        }
        if let Some(v) = get("APPUP_GRACE_PERIOD") {
            self.grace_period = parse_number("APPUP_GRACE_PERIOD", &v)?;
        }
        if let Some(v) = get("APPUP_DOWNLOAD_TIMEOUT") {
            self.download_timeout = parse_number("APPUP_DOWNLOAD_TIMEOUT", &v)?;
        }
        if let Some(v) = get("APPUP_CONNECT_TIMEOUT") {
            self.connect_timeout = parse_number("APPUP_CONNECT_TIMEOUT", &v)?;
        }
        if let Some(v) = get("APPUP_METADATA_TIMEOUT") {
            self.metadata_timeout = parse_number("APPUP_METADATA_TIMEOUT", &v)?;
        }
        if let Some(v) = get("APPUP_MAX_ATTEMPTS") {
            self.max_attempts = parse_number("APPUP_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("APPUP_RETRY_DELAY") {
            self.retry_delay = parse_number("APPUP_RETRY_DELAY", &v)?;
        }
        if let Some(v) = get("APPUP_DEBUG") {
            self.debug = parse_bool("APPUP_DEBUG", &v)?;
        }
        if let Some(v) = get("APPUP_SELF_CHECK") {
            self.self_check = parse_bool("APPUP_SELF_CHECK", &v)?;
        }
        if let Some(v) = get("APPUP_LOCK_PATH") {
            self.lock_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("APPUP_BACKUP_COMMAND") {
            self.backup_command = Some(PathBuf::from(v));
        }
        if let Some(v) = get("APPUP_PACKAGE_FAMILY") {
            self.package_family = Some(v.parse().map_err(|message| AppupError::ConfigError {
                message: format!("APPUP_PACKAGE_FAMILY: {message}"),
            })?);
        }
        if let Some(v) = get("APPUP_USE_SUDO") {
            self.use_sudo = parse_bool("APPUP_USE_SUDO", &v)?;
        }
        if let Some(v) = get("APPUP_APP_NAME") {
            self.app.name = v;
        }
        if let Some(v) = get("APPUP_DEB_URL") {
            self.app.deb_url = Some(v);
        }
        if let Some(v) = get("APPUP_RPM_URL") {
            self.app.rpm_url = Some(v);
        }
        Ok(())
    }

    /// Expand `~` in paths and clamp values that must be positive.
    fn normalize(&mut self) {
        self.download_dir = expand_path(&self.download_dir);
        self.lock_path = self.lock_path.as_deref().map(expand_path);
        self.backup_command = self.backup_command.as_deref().map(expand_path);
        self.max_attempts = self.max_attempts.max(1);
        if self.app.name.trim().is_empty() {
            self.app.name = AppConfig::default().name;
        }
    }

    /// Effective instance lock path.
    pub fn lock_path(&self) -> PathBuf {
        self.lock_path.clone().unwrap_or_else(InstanceLock::default_path)
    }

    /// Download URL configured for `format`.
    pub fn artifact_url(&self, format: PackageFormat) -> Option<&str> {
        match format {
            PackageFormat::Deb => self.app.deb_url.as_deref(),
            PackageFormat::Rpm => self.app.rpm_url.as_deref(),
        }
    }

    /// Fetcher settings.
    pub fn fetch_options(&self, show_progress: bool) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.download_timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            max_attempts: self.max_attempts.max(1),
            retry_delay: Duration::from_secs(self.retry_delay),
            show_progress,
        }
    }

    /// Resolver for the remote metadata, bounded by `metadata_timeout`
    /// rather than the much longer transfer timeout.
    pub fn metadata_resolver(&self) -> Result<HttpMetadataResolver> {
        HttpMetadataResolver::new(
            Duration::from_secs(self.connect_timeout),
            Duration::from_secs(self.metadata_timeout.max(1)),
        )
    }

    /// Cleanup settings for the resource registry.
    pub fn cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            grace_period: Duration::from_secs(self.grace_period),
            allowed_prefixes: default_allowed_prefixes(),
        }
    }
}

/// Expand a leading `~` and `$VAR`s. Paths that fail to expand are kept.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
