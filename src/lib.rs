//! appup - resumable download-and-install updater
//!
//! appup keeps one application up to date on a Linux host. It downloads the
//! latest `.deb` or `.rpm` build, resuming interrupted transfers, verifies it,
//! backs up the application's user data and installs the package with the
//! native package manager.
//!
//! # Pipeline
//!
//! ```text
//! InstanceLock ─▶ needs_download ─▶ ResumableFetcher ─▶ ArtifactVerifier ─▶ BackupManager ─▶ Installer
//!      ▲                                                                                         │
//!      └──────────────── ResourceRegistry reconciled by CleanupScope on every exit ◀──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`lock`] - single-instance guard (PID lock file)
//! - [`download`] - remote metadata, staleness evaluation, resumable fetch, verification
//! - [`installer`] - package families, detection and installation with dependency repair
//! - [`registry`] - tracked resources and the guaranteed cleanup scope
//! - [`backup`] - external backup utility
//! - [`doctor`] - host self-check
//! - [`pipeline`] - the update pipeline
//! - [`config`] - TOML file and `APPUP_*` environment configuration
//! - [`cli`] - command-line interface
//! - [`core`] - error types and user-facing error rendering
//!
//! # Persisted State
//!
//! ```text
//! $XDG_RUNTIME_DIR/appup.lock            owning PID, one line
//! ~/.cache/appup/downloads/app.deb       cached artifact (possibly partial)
//! ~/.cache/appup/downloads/app.deb.metadata
//!     CONTENT_LENGTH=...
//!     LAST_MODIFIED=...
//!     ETAG=...
//!     TIMESTAMP=...
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod doctor;
pub mod download;
pub mod installer;
pub mod lock;
pub mod pipeline;
pub mod registry;
pub mod utils;

// Shared by unit tests and the integration suite.
#[doc(hidden)]
pub mod test_utils;
