//! Global constants used throughout the appup codebase.
//!
//! This module contains timeout durations, retry parameters, file names and
//! other values that are used across multiple modules. Defining them centrally
//! keeps the configuration defaults and the on-disk layout discoverable.

use std::time::Duration;

/// File name of the single-instance lock token.
pub const LOCK_FILE_NAME: &str = "appup.lock";

/// Suffix appended to the artifact file name for the metadata sidecar.
pub const METADATA_SUFFIX: &str = "metadata";

/// Prefix of the per-run scratch directory under the system temp dir.
pub const RUN_DIR_PREFIX: &str = "appup-";

/// Default partial-download threshold (10 MiB).
///
/// On abnormal exit, a cached artifact smaller than this is discarded rather
/// than kept for resume.
pub const DEFAULT_PARTIAL_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Default grace period between SIGTERM and SIGKILL for tracked processes.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Default upper bound for one download attempt (30 minutes).
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 1800;

/// Default timeout for establishing a connection.
///
/// Kept short and separate from the transfer timeout so an unreachable host
/// fails an attempt quickly while a slow transfer still has room to finish.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default timeout for the metadata `HEAD` request.
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 30;

/// Default number of download attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between download attempts.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Interval between liveness checks while waiting for a process to exit.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of leading bytes read when sniffing the artifact format.
pub const SNIFF_LEN: usize = 512;

/// Arguments passed to the backup utility to restore without prompting.
pub const BACKUP_RESTORE_ARGS: [&str; 2] = ["--restore", "--yes"];

/// User agent sent with every HTTP request.
pub const USER_AGENT: &str = concat!("appup/", env!("CARGO_PKG_VERSION"));
