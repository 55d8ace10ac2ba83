//! Error handling for appup
//!
//! This module provides the error types and user-facing error reporting for the
//! updater. The error system follows two principles:
//! 1. **Strongly-typed errors** for every failure the pipeline can signal
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`AppupError`] - Enumerated error types for every pipeline stage
//! - [`ErrorContext`] - Wrapper that adds details and suggestions for display
//!
//! # Error Categories
//!
//! - **Single-instance guard**: [`AppupError::AlreadyRunning`], [`AppupError::AcquireFailed`]
//! - **Transfer**: [`AppupError::NetworkError`], [`AppupError::DownloadFailed`]
//! - **Verification**: [`AppupError::ArtifactMissing`], [`AppupError::ArtifactEmpty`],
//!   [`AppupError::FormatInvalid`], [`AppupError::SizeMismatch`]
//! - **Installation**: [`AppupError::InstallFailed`], [`AppupError::BackupFailed`]
//! - **Environment**: [`AppupError::ConfigError`], [`AppupError::PlatformNotSupported`]
//!
//! Every variant maps to a distinct process exit code via [`AppupError::exit_code`],
//! so scripts wrapping the updater can tell lock contention apart from a broken
//! download without parsing output.
//!
//! # Examples
//!
//! ```rust,no_run
//! use appup_cli::core::{AppupError, user_friendly_error};
//!
//! let err = AppupError::AlreadyRunning {
//!     pid: 4242,
//!     lock_path: "/run/user/1000/appup.lock".into(),
//! };
//! assert_eq!(err.exit_code(), 2);
//!
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::installer::PackageFormat;

/// Exit code used when the failure has no more specific classification.
pub const EXIT_FAILURE: i32 = 1;

/// Errors raised by the download-and-install pipeline.
#[derive(Error, Debug)]
pub enum AppupError {
    /// Another live process holds the instance lock (lock contention).
    #[error("Another appup instance is already running (PID {pid})")]
    AlreadyRunning {
        /// PID recorded in the lock file
        pid: u32,
        /// Lock file path, reported so the user can remove it manually
        lock_path: PathBuf,
    },

    /// The lock could not be created, even after reclaiming a stale token.
    #[error("Failed to acquire instance lock at {path}: {reason}")]
    AcquireFailed {
        /// Lock file path
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// A request produced no response at all.
    #[error("Network error: {operation}")]
    NetworkError {
        /// What was being attempted (e.g. "resolve remote metadata")
        operation: String,
        /// Transport-level reason
        reason: String,
    },

    /// The artifact could not be completed within the attempt budget.
    #[error("Download failed after {attempts} attempt(s): {url}")]
    DownloadFailed {
        /// Artifact URL
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// Bytes present on disk when giving up
        received: u64,
        /// Expected total size
        expected: u64,
    },

    /// The downloaded artifact is not on disk.
    #[error("Downloaded artifact not found: {path}")]
    ArtifactMissing {
        /// Expected artifact path
        path: PathBuf,
    },

    /// The downloaded artifact has zero bytes.
    #[error("Downloaded artifact is empty: {path}")]
    ArtifactEmpty {
        /// Artifact path
        path: PathBuf,
    },

    /// The sniffed content does not match the expected package format.
    #[error("Downloaded artifact is not a {expected} package (found {detected}): {path}")]
    FormatInvalid {
        /// Artifact path
        path: PathBuf,
        /// Format required by the detected package family
        expected: PackageFormat,
        /// Human readable description of what was found instead
        detected: String,
    },

    /// The artifact length differs from the recorded content length.
    #[error("Artifact size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        /// Artifact path
        path: PathBuf,
        /// Content length recorded in the metadata snapshot
        expected: u64,
        /// Actual length on disk
        actual: u64,
    },

    /// The package manager rejected the artifact.
    #[error("Installation failed: {command}")]
    InstallFailed {
        /// The command line that failed last
        command: String,
        /// Exit status description
        reason: String,
    },

    /// The external backup utility failed.
    #[error("Backup failed: {command}")]
    BackupFailed {
        /// The command line that failed
        command: String,
        /// Exit status description
        reason: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// No supported package manager was found.
    #[error("Unsupported platform: {reason}")]
    PlatformNotSupported {
        /// What is missing
        reason: String,
    },

    /// The run was cut short by a termination signal.
    #[error("Interrupted by {signal}")]
    Interrupted {
        /// Signal name (SIGINT, SIGTERM, SIGHUP)
        signal: String,
        /// Conventional 128+N exit code for the signal
        code: i32,
    },

    /// Any other I/O failure.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppupError {
    /// Process exit code for this error.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 1 | generic failure (config, platform, I/O) |
    /// | 2 | lock contention / lock acquisition |
    /// | 3 | network or download failure |
    /// | 4 | artifact verification failure |
    /// | 5 | install failure |
    /// | 6 | backup failure |
    /// | 128+N | interrupted by signal N |
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyRunning {
                ..
            }
            | Self::AcquireFailed {
                ..
            } => 2,
            Self::NetworkError {
                ..
            }
            | Self::DownloadFailed {
                ..
            } => 3,
            Self::ArtifactMissing {
                ..
            }
            | Self::ArtifactEmpty {
                ..
            }
            | Self::FormatInvalid {
                ..
            }
            | Self::SizeMismatch {
                ..
            } => 4,
            Self::InstallFailed {
                ..
            } => 5,
            Self::BackupFailed {
                ..
            } => 6,
            Self::Interrupted {
                code,
                ..
            } => *code,
            Self::ConfigError {
                ..
            }
            | Self::PlatformNotSupported {
                ..
            }
            | Self::IoError(_) => EXIT_FAILURE,
        }
    }
}

/// Exit code for an arbitrary error chain.
///
/// Looks for an [`AppupError`] anywhere in the chain so that context added with
/// `anyhow::Context` does not hide the classification.
#[must_use]
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<AppupError>())
        .map_or(EXIT_FAILURE, AppupError::exit_code)
}

/// An error message enriched with details and a suggestion for the user.
#[derive(Debug)]
pub struct ErrorContext {
    /// Primary error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new context from any displayable error.
    #[must_use]
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            message: error.to_string(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with suggestions.
///
/// Recognised [`AppupError`] variants get tailored advice; anything else is
/// reported with its full context chain as details.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(appup_error) = error.chain().find_map(|c| c.downcast_ref::<AppupError>()) {
        return create_error_context(appup_error, &error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(&error)
            .with_suggestion("Check ownership of the download and lock directories")
            .with_details("appup could not read or write one of its working files");
    }

    let mut ctx = ErrorContext::new(&error);
    let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !causes.is_empty() {
        ctx = ctx.with_details(causes.join(": "));
    }
    ctx
}

fn create_error_context(error: &AppupError, chain: &anyhow::Error) -> ErrorContext {
    let ctx = ErrorContext::new(chain);
    match error {
        AppupError::AlreadyRunning {
            lock_path,
            ..
        } => ctx
            .with_details("Only one appup instance may run per host")
            .with_suggestion(format!(
                "Wait for the other run to finish, or remove {} if that process is gone",
                lock_path.display()
            )),
        AppupError::AcquireFailed {
            path,
            ..
        } => ctx.with_suggestion(format!(
            "Check permissions on {} or set APPUP_LOCK_PATH",
            path.parent().map_or_else(|| path.display().to_string(), |p| p.display().to_string())
        )),
        AppupError::NetworkError {
            reason,
            ..
        } => ctx
            .with_details(reason.clone())
            .with_suggestion("Check your network connection and the configured download URL"),
        AppupError::DownloadFailed {
            received,
            expected,
            ..
        } => ctx
            .with_details(format!("{received} of {expected} bytes on disk; the partial file is kept"))
            .with_suggestion("Run the update again to resume, or raise APPUP_MAX_ATTEMPTS"),
        AppupError::FormatInvalid {
            ..
        } => ctx
            .with_details("The server probably returned an error or redirect page instead of the package")
            .with_suggestion("Verify the download URL in a browser, then run `appup clean` and retry"),
        AppupError::SizeMismatch {
            ..
        }
        | AppupError::ArtifactEmpty {
            ..
        }
        | AppupError::ArtifactMissing {
            ..
        } => ctx.with_suggestion("Run `appup clean` and retry the update"),
        AppupError::InstallFailed {
            reason,
            ..
        } => ctx
            .with_details(reason.clone())
            .with_suggestion("Inspect the package manager output above; the downloaded artifact is kept"),
        AppupError::BackupFailed {
            reason,
            ..
        } => ctx
            .with_details(reason.clone())
            .with_suggestion("Fix the backup utility or rerun with --no-backup"),
        AppupError::ConfigError {
            ..
        } => ctx.with_suggestion("Check APPUP_* environment variables and the config file"),
        AppupError::PlatformNotSupported {
            ..
        } => ctx.with_suggestion("Set APPUP_PACKAGE_FAMILY to apt, dnf, yum or zypper"),
        AppupError::Interrupted {
            ..
        } => ctx.with_details("Partial downloads are kept and resumed on the next run"),
        AppupError::IoError(_) => ctx,
    }
}
