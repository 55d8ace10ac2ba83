//! Process-wide resource tracking and exit-time reconciliation.
//!
//! Every side effect the pipeline creates that must be undone at exit is
//! registered here: temp files, temp directories, background processes and
//! the instance lock. [`ResourceRegistry::reconcile`] drains the registry once
//! and processes exactly what was registered. It never scans the filesystem
//! for extras.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──begin()──▶ Running ──reconcile(code)──▶ CleaningUp ──▶ Done(code)
//! ```
//!
//! Reconciliation order:
//! 1. background processes: SIGTERM, poll for the grace period, then SIGKILL
//! 2. temp files: removed only when owned by the current effective uid
//! 3. temp directories: removed only when owned and under an allow-listed prefix
//! 4. lock files: removed unconditionally
//! 5. on a non-zero exit, a tracked artifact below the partial threshold is removed
//!
//! Reconciliation never changes the exit code it is given, never panics, and
//! is a no-op on an already drained registry. Use [`CleanupScope`] to make sure
//! it runs on every exit path.

mod scope;

pub use scope::{CleanupScope, shutdown_signal};

use nix::sys::signal::Signal;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::constants::{PROCESS_POLL_INTERVAL, RUN_DIR_PREFIX};
use crate::utils::process::{current_euid, is_process_alive, reap_if_child, send_signal};

/// A side effect that must be reversed at exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedResource {
    /// A temporary file
    TempFile(PathBuf),
    /// A temporary directory
    TempDir(PathBuf),
    /// A background process id
    Process(u32),
    /// The single-instance lock token
    LockFile(PathBuf),
}

/// Lifecycle phase of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPhase {
    /// Created, pipeline not yet started
    Idle,
    /// Pipeline running, resources being registered
    Running,
    /// Reconciliation in progress
    CleaningUp,
    /// Reconciliation finished with this exit code
    Done(i32),
}

/// Settings that govern reconciliation.
#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    /// How long to wait between SIGTERM and SIGKILL
    pub grace_period: Duration,
    /// Directories under which temp directories may be deleted
    pub allowed_prefixes: Vec<PathBuf>,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(crate::constants::DEFAULT_GRACE_PERIOD_SECS),
            allowed_prefixes: default_allowed_prefixes(),
        }
    }
}

/// The allow-list for temp directory removal: the system temp dir, this run's
/// scratch dir and the user's cache root.
pub fn default_allowed_prefixes() -> Vec<PathBuf> {
    let mut prefixes = vec![std::env::temp_dir(), run_dir()];
    if let Some(cache) = dirs::cache_dir() {
        prefixes.push(cache);
    }
    prefixes
}

/// Per-run scratch directory: `<temp>/appup-<pid>`.
pub fn run_dir() -> PathBuf {
    std::env::temp_dir().join(format!("{RUN_DIR_PREFIX}{}", std::process::id()))
}

#[derive(Debug, Clone)]
struct TrackedArtifact {
    path: PathBuf,
    threshold: u64,
}

#[derive(Debug)]
struct RegistryState {
    phase: CleanupPhase,
    resources: Vec<TrackedResource>,
    artifact: Option<TrackedArtifact>,
}

/// Shared handle to the process-wide resource registry.
///
/// Cloning is cheap; all clones refer to the same registry.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    state: Arc<Mutex<RegistryState>>,
    policy: Arc<CleanupPolicy>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(CleanupPolicy::default())
    }
}

impl ResourceRegistry {
    /// Create an empty registry in the `Idle` phase.
    pub fn new(policy: CleanupPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                phase: CleanupPhase::Idle,
                resources: Vec::new(),
                artifact: None,
            })),
            policy: Arc::new(policy),
        }
    }

    // A panic while holding the lock must not prevent cleanup.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Move from `Idle` to `Running`.
    pub fn begin(&self) {
        let mut state = self.lock();
        if state.phase == CleanupPhase::Idle {
            state.phase = CleanupPhase::Running;
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> CleanupPhase {
        self.lock().phase
    }

    /// Snapshot of the registered resources, in registration order.
    pub fn resources(&self) -> Vec<TrackedResource> {
        self.lock().resources.clone()
    }

    fn register(&self, resource: TrackedResource) {
        debug!("Tracking {:?}", resource);
        self.lock().resources.push(resource);
    }

    /// Track a temporary file.
    pub fn register_file(&self, path: impl Into<PathBuf>) {
        self.register(TrackedResource::TempFile(path.into()));
    }

    /// Track a temporary directory.
    pub fn register_dir(&self, path: impl Into<PathBuf>) {
        self.register(TrackedResource::TempDir(path.into()));
    }

    /// Track a background process.
    pub fn register_process(&self, pid: u32) {
        self.register(TrackedResource::Process(pid));
    }

    /// Stop tracking a process that exited on its own.
    pub fn unregister_process(&self, pid: u32) {
        self.lock().resources.retain(|r| *r != TrackedResource::Process(pid));
    }

    /// Track a lock file.
    pub fn register_lock(&self, path: impl Into<PathBuf>) {
        self.register(TrackedResource::LockFile(path.into()));
    }

    /// Track the cached artifact so an undersized partial download is
    /// discarded on abnormal exit.
    pub fn track_artifact(&self, path: impl Into<PathBuf>, threshold: u64) {
        self.lock().artifact = Some(TrackedArtifact {
            path: path.into(),
            threshold,
        });
    }

    /// Reconcile every registered resource and return `exit_code` unchanged.
    ///
    /// Safe to call more than once; later calls find an empty registry and do
    /// nothing.
    pub fn reconcile(&self, exit_code: i32) -> i32 {
        let (resources, artifact) = {
            let mut state = self.lock();
            if state.resources.is_empty() && state.artifact.is_none() {
                if !matches!(state.phase, CleanupPhase::Done(_)) {
                    state.phase = CleanupPhase::Done(exit_code);
                }
                return exit_code;
            }
            state.phase = CleanupPhase::CleaningUp;
            (std::mem::take(&mut state.resources), state.artifact.take())
        };

        debug!("Reconciling {} tracked resource(s), exit code {}", resources.len(), exit_code);

        let mut processes = Vec::new();
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut locks = Vec::new();
        for resource in resources {
            match resource {
                TrackedResource::Process(pid) => processes.push(pid),
                TrackedResource::TempFile(path) => files.push(path),
                TrackedResource::TempDir(path) => dirs.push(path),
                TrackedResource::LockFile(path) => locks.push(path),
            }
        }

        terminate_processes(&processes, self.policy.grace_period);
        for path in &files {
            remove_owned_file(path);
        }
        for path in &dirs {
            remove_allowed_dir(path, &self.policy.allowed_prefixes);
        }
        for path in &locks {
            remove_lock(path);
        }
        if exit_code != 0
            && let Some(artifact) = artifact
        {
            discard_partial_artifact(&artifact);
        }

        self.lock().phase = CleanupPhase::Done(exit_code);
        exit_code
    }
}

fn terminate_processes(pids: &[u32], grace_period: Duration) {
    let mut pending: Vec<u32> = pids
        .iter()
        .copied()
        .filter(|pid| {
            reap_if_child(*pid);
            is_process_alive(*pid)
        })
        .collect();
    if pending.is_empty() {
        return;
    }

    for pid in &pending {
        debug!("Sending SIGTERM to {}", pid);
        if let Err(e) = send_signal(*pid, Signal::SIGTERM) {
            debug!("SIGTERM to {} failed: {}", pid, e);
        }
    }

    let deadline = Instant::now() + grace_period;
    loop {
        pending.retain(|pid| {
            reap_if_child(*pid);
            is_process_alive(*pid)
        });
        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(PROCESS_POLL_INTERVAL);
    }

    for pid in pending {
        warn!("Process {} ignored SIGTERM, killing it", pid);
        if let Err(e) = send_signal(pid, Signal::SIGKILL) {
            warn!("Failed to kill process {}: {}", pid, e);
        }
        reap_if_child(pid);
    }
}

fn is_owned(path: &Path) -> Option<bool> {
    std::fs::symlink_metadata(path).ok().map(|meta| meta.uid() == current_euid())
}

fn remove_owned_file(path: &Path) {
    match is_owned(path) {
        None => debug!("Temp file already gone: {}", path.display()),
        Some(false) => warn!("Not removing {}: owned by another user", path.display()),
        Some(true) => match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed temp file {}", path.display()),
            Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
        },
    }
}

/// Whether `path` lies strictly below one of `prefixes`.
///
/// Both sides are canonicalized so `..` components and symlinks cannot escape
/// the allow-list. A prefix itself is never a valid target.
pub fn is_under_allowed_prefix(path: &Path, prefixes: &[PathBuf]) -> bool {
    let Ok(path) = path.canonicalize() else {
        return false;
    };
    prefixes.iter().filter_map(|prefix| prefix.canonicalize().ok()).any(|prefix| {
        path != prefix && path.starts_with(&prefix)
    })
}

fn remove_allowed_dir(path: &Path, prefixes: &[PathBuf]) {
    match is_owned(path) {
        None => debug!("Temp dir already gone: {}", path.display()),
        Some(false) => warn!("Not removing {}: owned by another user", path.display()),
        Some(true) if !is_under_allowed_prefix(path, prefixes) => {
            warn!("Not removing {}: outside the allowed temp locations", path.display());
        }
        Some(true) => match std::fs::remove_dir_all(path) {
            Ok(()) => debug!("Removed temp dir {}", path.display()),
            Err(e) => warn!("Failed to remove temp dir {}: {}", path.display(), e),
        },
    }
}

fn remove_lock(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Released lock {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove lock {}: {}", path.display(), e),
    }
}

fn discard_partial_artifact(artifact: &TrackedArtifact) {
    let Ok(meta) = std::fs::metadata(&artifact.path) else {
        return;
    };
    if meta.len() >= artifact.threshold {
        info!(
            "Keeping partial download {} ({} bytes) for resume",
            artifact.path.display(),
            meta.len()
        );
        return;
    }
    match std::fs::remove_file(&artifact.path) {
        Ok(()) => info!(
            "Discarded partial download {} ({} bytes)",
            artifact.path.display(),
            meta.len()
        ),
        Err(e) => warn!("Failed to remove partial download {}: {}", artifact.path.display(), e),
    }
}
