//! Single-instance guard.
//!
//! Only one appup pipeline may run per host. Exclusion is a lock token file
//! created with `O_CREAT | O_EXCL` that holds the owner's PID on a single line.
//! A token whose owner is gone is stale and is reclaimed by the next acquirer.
//!
//! The guard never removes its own token. The path is registered with the
//! [`ResourceRegistry`] on acquisition and released when the registry is
//! reconciled at exit, on every exit path.
//!
//! # Lock File Location
//!
//! ```text
//! $XDG_RUNTIME_DIR/appup.lock     (preferred)
//! <system temp>/appup.lock        (fallback)
//! ```

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::LOCK_FILE_NAME;
use crate::core::AppupError;
use crate::registry::ResourceRegistry;
use crate::utils::process::is_process_alive;

/// Exclusive ownership of the pipeline for this host.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    pid: u32,
}

enum CreateOutcome {
    Created,
    Exists,
}

impl InstanceLock {
    /// Default lock path: the user runtime dir, falling back to the system
    /// temp dir.
    pub fn default_path() -> PathBuf {
        dirs::runtime_dir().unwrap_or_else(std::env::temp_dir).join(LOCK_FILE_NAME)
    }

    /// Acquire the lock at `path`.
    ///
    /// # Errors
    ///
    /// - [`AppupError::AlreadyRunning`] when a live process owns the token
    /// - [`AppupError::AcquireFailed`] when the token cannot be created, or
    ///   creation fails again after reclaiming a stale token
    pub fn acquire(path: &Path, registry: &ResourceRegistry) -> Result<Self, AppupError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| AppupError::AcquireFailed {
                path: path.to_path_buf(),
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        let pid = std::process::id();
        match try_create(path, pid) {
            Ok(CreateOutcome::Created) => return Ok(Self::registered(path, pid, registry)),
            Ok(CreateOutcome::Exists) => {}
            Err(e) => {
                return Err(AppupError::AcquireFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }

        match read_owner(path) {
            Some(owner) if is_process_alive(owner) => {
                return Err(AppupError::AlreadyRunning {
                    pid: owner,
                    lock_path: path.to_path_buf(),
                });
            }
            Some(owner) => info!("Reclaiming stale lock {} (PID {} is gone)", path.display(), owner),
            None => warn!("Reclaiming unreadable lock {}", path.display()),
        }

        if let Err(e) = std::fs::remove_file(path)
            && e.kind() != ErrorKind::NotFound
        {
            return Err(AppupError::AcquireFailed {
                path: path.to_path_buf(),
                reason: format!("cannot remove stale lock: {e}"),
            });
        }

        match try_create(path, pid) {
            Ok(CreateOutcome::Created) => Ok(Self::registered(path, pid, registry)),
            Ok(CreateOutcome::Exists) => Err(AppupError::AcquireFailed {
                path: path.to_path_buf(),
                reason: "lock was taken by another process while reclaiming it".to_string(),
            }),
            Err(e) => Err(AppupError::AcquireFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn registered(path: &Path, pid: u32, registry: &ResourceRegistry) -> Self {
        registry.register_lock(path);
        debug!("Acquired instance lock {} as PID {}", path.display(), pid);
        Self {
            path: path.to_path_buf(),
            pid,
        }
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID written into the token.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

fn try_create(path: &Path, pid: u32) -> std::io::Result<CreateOutcome> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(CreateOutcome::Exists),
        Err(e) => return Err(e),
    };
    writeln!(file, "{pid}")?;
    file.sync_all()?;
    Ok(CreateOutcome::Created)
}

/// PID recorded in the lock file at `path`, if readable.
pub fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.lines().next()?.trim().parse().ok()
}
