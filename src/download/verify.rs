//! Post-download artifact checks.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. the file exists
//! 2. it is not empty
//! 3. its leading bytes look like the expected package format
//! 4. its length equals the size from the metadata snapshot
//!
//! The format check is a magic-byte sniff. It catches the common failure of
//! an HTML error page saved in place of the package, but it is not an
//! integrity guarantee.

use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::constants::SNIFF_LEN;
use crate::core::AppupError;
use crate::installer::PackageFormat;

const AR_MAGIC: &[u8] = b"!<arch>\n";
const DEB_FIRST_MEMBER: &[u8] = b"debian-binary";
const RPM_MAGIC: &[u8] = &[0xED, 0xAB, 0xEE, 0xDB];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];

/// Validates a downloaded artifact before installation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactVerifier;

impl ArtifactVerifier {
    /// Verify `path` against `expected_format` and `expected_size`.
    ///
    /// # Errors
    ///
    /// [`AppupError::ArtifactMissing`], [`AppupError::ArtifactEmpty`],
    /// [`AppupError::FormatInvalid`] or [`AppupError::SizeMismatch`], in that
    /// order of precedence.
    pub fn verify(path: &Path, expected_format: PackageFormat, expected_size: u64) -> Result<u64, AppupError> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                return Err(AppupError::ArtifactMissing {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppupError::ArtifactMissing {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let actual = meta.len();
        if actual == 0 {
            return Err(AppupError::ArtifactEmpty {
                path: path.to_path_buf(),
            });
        }

        let head = read_head(path)?;
        if !matches_format(&head, expected_format) {
            return Err(AppupError::FormatInvalid {
                path: path.to_path_buf(),
                expected: expected_format,
                detected: describe_content(&head),
            });
        }

        if actual != expected_size {
            return Err(AppupError::SizeMismatch {
                path: path.to_path_buf(),
                expected: expected_size,
                actual,
            });
        }

        debug!("Verified {} ({} package, {} bytes)", path.display(), expected_format, actual);
        Ok(actual)
    }
}

fn read_head(path: &Path) -> Result<Vec<u8>, AppupError> {
    let file = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Whether `head` starts like a package of `format`.
pub fn matches_format(head: &[u8], format: PackageFormat) -> bool {
    match format {
        PackageFormat::Deb => {
            head.starts_with(AR_MAGIC) && head[AR_MAGIC.len()..].starts_with(DEB_FIRST_MEMBER)
        }
        PackageFormat::Rpm => head.starts_with(RPM_MAGIC),
    }
}

/// Human-readable guess at what `head` actually is.
pub fn describe_content(head: &[u8]) -> String {
    if matches_format(head, PackageFormat::Deb) {
        return "Debian package".to_string();
    }
    if matches_format(head, PackageFormat::Rpm) {
        return "RPM package".to_string();
    }
    if head.starts_with(AR_MAGIC) {
        return "ar archive (not a Debian package)".to_string();
    }
    if head.starts_with(GZIP_MAGIC) {
        return "gzip data".to_string();
    }

    let text = String::from_utf8_lossy(head);
    let lower = text.trim_start().to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") || lower.contains("<body") {
        return "HTML document (likely an error page)".to_string();
    }
    if lower.starts_with("<?xml") {
        return "XML document".to_string();
    }
    if lower.starts_with('{') || lower.starts_with('[') {
        return "JSON or text data".to_string();
    }
    if std::str::from_utf8(head).is_ok() {
        return "text data".to_string();
    }
    "unknown binary data".to_string()
}
