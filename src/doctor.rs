//! Host self-check.
//!
//! Verifies that an update could run on this host without actually running
//! one: URLs configured, package tooling present, and the download, lock and
//! scratch locations writable. The files written to test that are
//! registered with the [`ResourceRegistry`] so an interrupted check leaves
//! nothing behind.

use colored::Colorize;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

use crate::config::AppupConfig;
use crate::installer::{PackageFamily, command_exists, resolve_family};
use crate::registry::{ResourceRegistry, run_dir};
use crate::utils::fs::ensure_dir;
use crate::utils::process::is_root;

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Short name of what was checked
    pub name: String,
    /// Whether it passed
    pub passed: bool,
    /// What was found
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Run every check.
pub fn run_self_check(config: &AppupConfig, registry: &ResourceRegistry) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let family = match resolve_family(config.package_family) {
        Ok(family) => {
            results.push(check_family_tools(family));
            Some(family)
        }
        Err(e) => {
            results.push(CheckResult::fail("package family", e.to_string()));
            None
        }
    };

    results.push(match family {
        Some(family) => match config.artifact_url(family.format()) {
            Some(url) => CheckResult::pass("artifact url", url),
            None => CheckResult::fail(
                "artifact url",
                format!("no {} URL configured (APPUP_{}_URL)", family.format(), family.format().extension().to_uppercase()),
            ),
        },
        None => CheckResult::fail("artifact url", "package family unknown"),
    });

    if config.use_sudo && !is_root() {
        results.push(if command_exists("sudo") {
            CheckResult::pass("sudo", "available")
        } else {
            CheckResult::fail("sudo", "not found on PATH; run as root or set APPUP_USE_SUDO=false")
        });
    }

    results.push(check_writable("download dir", &config.download_dir, registry));

    let lock_path = config.lock_path();
    results.push(match lock_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => check_writable("lock dir", dir, registry),
        _ => CheckResult::fail("lock dir", format!("{} has no parent directory", lock_path.display())),
    });

    let scratch = run_dir();
    registry.register_dir(&scratch);
    results.push(check_writable("scratch dir", &scratch, registry));

    if let Some(command) = &config.backup_command {
        results.push(check_executable("backup utility", command));
    }

    results
}

fn check_family_tools(family: PackageFamily) -> CheckResult {
    let missing: Vec<&str> =
        family.required_tools().iter().copied().filter(|tool| !command_exists(tool)).collect();
    if missing.is_empty() {
        CheckResult::pass("package family", family.to_string())
    } else {
        CheckResult::fail("package family", format!("{family}: missing {}", missing.join(", ")))
    }
}

fn check_writable(name: &str, dir: &Path, registry: &ResourceRegistry) -> CheckResult {
    if let Err(e) = ensure_dir(dir) {
        return CheckResult::fail(name, format!("{e:#}"));
    }
    match tempfile::Builder::new().prefix(".appup-write-check-").tempfile_in(dir) {
        Ok(file) => {
            registry.register_file(file.path());
            debug!("Write check {} created", file.path().display());
            CheckResult::pass(name, format!("{} is writable", dir.display()))
        }
        Err(e) => CheckResult::fail(name, format!("{} is not writable: {e}", dir.display())),
    }
}

fn check_executable(name: &str, path: &Path) -> CheckResult {
    let resolved = if path.components().count() > 1 {
        Some(path.to_path_buf())
    } else {
        which::which(path).ok()
    };
    let Some(resolved) = resolved else {
        return CheckResult::fail(name, format!("{} not found on PATH", path.display()));
    };
    match std::fs::metadata(&resolved) {
        Ok(meta) if meta.is_file() && meta.permissions().mode() & 0o111 != 0 => {
            CheckResult::pass(name, resolved.display().to_string())
        }
        Ok(_) => CheckResult::fail(name, format!("{} is not executable", resolved.display())),
        Err(e) => CheckResult::fail(name, format!("{}: {e}", resolved.display())),
    }
}

/// Whether every check passed.
pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.passed)
}

/// Print the report, one colored line per check.
pub fn print_report(results: &[CheckResult]) {
    for result in results {
        let mark = if result.passed { "✓".green() } else { "✗".red() };
        println!("{} {}: {}", mark, result.name.bold(), result.detail);
    }
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        println!("{}", "All checks passed".green().bold());
    } else {
        println!("{}", format!("{failed} check(s) failed").red().bold());
    }
}
