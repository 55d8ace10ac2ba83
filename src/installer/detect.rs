//! Package family detection by probing `PATH`.

use tracing::debug;

use super::PackageFamily;
use crate::core::AppupError;

/// Whether `tool` resolves on `PATH`.
pub fn command_exists(tool: &str) -> bool {
    which::which(tool).is_ok()
}

/// Detect the package family of this host.
///
/// The first family in [`PackageFamily::ALL`] whose tools are all present
/// wins.
///
/// # Errors
///
/// [`AppupError::PlatformNotSupported`] when no supported tooling is found.
pub fn detect_family() -> Result<PackageFamily, AppupError> {
    detect_with(command_exists)
}

/// Resolve the family: an explicit override wins over detection.
pub fn resolve_family(configured: Option<PackageFamily>) -> Result<PackageFamily, AppupError> {
    match configured {
        Some(family) => {
            debug!("Using configured package family {}", family);
            Ok(family)
        }
        None => detect_family(),
    }
}

fn detect_with(exists: impl Fn(&str) -> bool) -> Result<PackageFamily, AppupError> {
    PackageFamily::ALL
        .into_iter()
        .find(|family| family.required_tools().iter().all(|tool| exists(tool)))
        .inspect(|family| debug!("Detected package family {}", family))
        .ok_or_else(|| AppupError::PlatformNotSupported {
            reason: "no apt, dnf, yum or zypper installation found on PATH".to_string(),
        })
}
