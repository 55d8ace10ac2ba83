//! Package families and the artifact formats they consume.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::utils::process::CommandSpec;

/// On-disk package format expected by a [`PackageFamily`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// Debian `ar` archive
    Deb,
    /// RPM package
    Rpm,
}

impl PackageFormat {
    /// File extension used for the cached artifact.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Deb => "deb",
            Self::Rpm => "rpm",
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Class of native installation tooling.
///
/// [`PackageFamily::Apt`] is the dependency-resolving kind: `dpkg -i` leaves
/// missing dependencies unresolved and `apt-get install -f` repairs them. The
/// rpm families resolve dependencies inside their install command and get no
/// repair pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFamily {
    /// Debian, Ubuntu and derivatives
    Apt,
    /// Fedora, RHEL 8+
    Dnf,
    /// Older RHEL / CentOS
    Yum,
    /// openSUSE, SLES
    Zypper,
}

impl PackageFamily {
    /// All families, in detection priority order.
    pub const ALL: [Self; 4] = [Self::Apt, Self::Dnf, Self::Yum, Self::Zypper];

    /// Artifact format this family installs.
    #[must_use]
    pub const fn format(self) -> PackageFormat {
        match self {
            Self::Apt => PackageFormat::Deb,
            Self::Dnf | Self::Yum | Self::Zypper => PackageFormat::Rpm,
        }
    }

    /// Executables that must be on `PATH` for this family.
    #[must_use]
    pub const fn required_tools(self) -> &'static [&'static str] {
        match self {
            Self::Apt => &["dpkg", "apt-get"],
            Self::Dnf => &["dnf"],
            Self::Yum => &["yum"],
            Self::Zypper => &["zypper"],
        }
    }

    /// Command that installs the package file at `path`.
    #[must_use]
    pub fn install_command(self, path: &Path) -> CommandSpec {
        let path = path.display().to_string();
        match self {
            Self::Apt => CommandSpec::new("dpkg").args(["-i", &path]),
            Self::Dnf => CommandSpec::new("dnf").args(["install", "-y", &path]),
            Self::Yum => CommandSpec::new("yum").args(["install", "-y", &path]),
            Self::Zypper => CommandSpec::new("zypper").args([
                "--non-interactive",
                "install",
                "--allow-unsigned-rpm",
                &path,
            ]),
        }
    }

    /// Dependency-repair command, for families that need one.
    #[must_use]
    pub fn repair_command(self) -> Option<CommandSpec> {
        match self {
            Self::Apt => Some(CommandSpec::new("apt-get").args(["install", "-f", "-y"])),
            Self::Dnf | Self::Yum | Self::Zypper => None,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Zypper => "zypper",
        }
    }
}

impl fmt::Display for PackageFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackageFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apt" | "deb" | "debian" | "dpkg" => Ok(Self::Apt),
            "dnf" | "fedora" => Ok(Self::Dnf),
            "yum" => Ok(Self::Yum),
            "zypper" | "suse" => Ok(Self::Zypper),
            other => Err(format!("unknown package family '{other}'")),
        }
    }
}
