//! Process helpers: liveness checks, signal delivery and external commands.
//!
//! Liveness uses signal-0 semantics (`kill(pid, 0)`) rather than scanning the
//! process table. This is cheap and race-free for our purposes but cannot see
//! across PID namespaces: a lock written from inside a container may look
//! stale from the host. That is an accepted limitation.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::{Pid, geteuid};
use std::fmt;
use std::future::Future;
use tracing::debug;

use crate::registry::ResourceRegistry;

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|raw| *raw > 0).map(Pid::from_raw)
}

/// Returns `true` if a process with `pid` exists.
///
/// `EPERM` means the process exists but belongs to someone else, which still
/// counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };
    match kill(pid, None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send `signal` to `pid`.
pub fn send_signal(pid: u32, signal: Signal) -> std::result::Result<(), Errno> {
    let Some(target) = to_pid(pid) else {
        return Err(Errno::ESRCH);
    };
    kill(target, signal)
}

/// Reap `pid` if it is an exited child of this process.
///
/// Without this an exited child stays a zombie and keeps answering liveness
/// checks until the parent exits. Non-children are ignored.
pub fn reap_if_child(pid: u32) {
    if let Some(target) = to_pid(pid) {
        let _ = waitpid(target, Some(WaitPidFlag::WNOHANG));
    }
}

/// Effective uid of the current process.
pub fn current_euid() -> u32 {
    geteuid().as_raw()
}

/// Whether the current process runs as root.
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments, passed verbatim
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prefix the command with `sudo` when `elevate` is set.
    #[must_use]
    pub fn elevated(self, elevate: bool) -> Self {
        if !elevate {
            return self;
        }
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of running a [`CommandSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl CommandOutcome {
    /// A successful outcome.
    pub const SUCCESS: Self = Self {
        code: Some(0),
    };

    /// A failed outcome with the given exit code.
    #[must_use]
    pub const fn failed(code: i32) -> Self {
        Self {
            code: Some(code),
        }
    }

    /// Whether the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Short description for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes external commands.
///
/// The seam exists so installer and backup logic can be tested without
/// touching the system package manager.
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion.
    ///
    /// Returns `Err` only when the command could not be started at all.
    fn run(&self, command: &CommandSpec) -> impl Future<Output = Result<CommandOutcome>> + Send;
}

/// Runs commands on the host with inherited stdio.
///
/// The child's pid is registered with the [`ResourceRegistry`] while it runs,
/// so a run that is interrupted mid-command terminates the child when the
/// registry is reconciled.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    registry: ResourceRegistry,
}

impl SystemRunner {
    /// Create a runner that tracks its children in `registry`.
    pub fn new(registry: ResourceRegistry) -> Self {
        Self {
            registry,
        }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        debug!("Running: {}", command);
        let mut child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .spawn()
            .with_context(|| format!("Failed to start `{command}`"))?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.registry.register_process(pid);
        }
        let status = child.wait().await;
        if let Some(pid) = pid {
            self.registry.unregister_process(pid);
        }

        let status = status.with_context(|| format!("Failed to wait for `{command}`"))?;
        Ok(CommandOutcome {
            code: status.code(),
        })
    }
}
