//! Decides whether the cached artifact must be (re)fetched.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::metadata::{MetadataResolver, RemoteMetadata};
use crate::constants::METADATA_SUFFIX;
use crate::utils::fs::file_len;

/// The cached package file and its metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Package file
    pub path: PathBuf,
    /// `KEY=value` sidecar next to it
    pub metadata_path: PathBuf,
}

impl CachedArtifact {
    /// Artifact at `path`, sidecar at `<path>.metadata`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".");
        name.push(METADATA_SUFFIX);
        let metadata_path = path.with_file_name(name);
        Self {
            path,
            metadata_path,
        }
    }

    /// Artifact for `app_name` with the given extension inside `dir`.
    pub fn in_dir(dir: &Path, app_name: &str, extension: &str) -> Self {
        Self::new(dir.join(format!("{app_name}.{extension}")))
    }

    /// Current size on disk, `None` if absent.
    pub fn size(&self) -> Result<Option<u64>> {
        file_len(&self.path)
    }

    /// Saved metadata snapshot, `None` if absent.
    pub async fn saved_metadata(&self) -> Result<Option<RemoteMetadata>> {
        RemoteMetadata::load(&self.metadata_path).await
    }
}

/// Outcome of [`needs_download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadDecision {
    /// Nothing cached: fresh download.
    NoCachedFile,
    /// Bytes cached but no usable sidecar: fresh download.
    NoSavedMetadata,
    /// Cached bytes are a prefix of the saved length: resume.
    Incomplete {
        /// Bytes already on disk
        offset: u64,
        /// Saved total length
        expected: u64,
    },
    /// More bytes cached than the saved length: fresh download.
    Oversized {
        /// Bytes on disk
        size: u64,
        /// Saved total length
        expected: u64,
    },
    /// The remote artifact changed since it was cached.
    RemoteChanged {
        /// Offset the fetch starts from
        offset: u64,
        /// New remote snapshot
        fresh: RemoteMetadata,
    },
    /// Cache matches the remote artifact.
    UpToDate,
}

impl DownloadDecision {
    /// Whether a fetch is required.
    pub fn needs_fetch(&self) -> bool {
        !matches!(self, Self::UpToDate)
    }

    /// Byte offset the fetch should start from.
    pub fn start_offset(&self) -> u64 {
        match self {
            Self::Incomplete {
                offset,
                ..
            }
            | Self::RemoteChanged {
                offset,
                ..
            } => *offset,
            Self::NoCachedFile | Self::NoSavedMetadata | Self::Oversized { .. } | Self::UpToDate => 0,
        }
    }
}

impl fmt::Display for DownloadDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCachedFile => write!(f, "no cached download"),
            Self::NoSavedMetadata => write!(f, "cached download has no metadata"),
            Self::Incomplete {
                offset,
                expected,
            } => write!(f, "incomplete download ({offset} of {expected} bytes)"),
            Self::Oversized {
                size,
                expected,
            } => write!(f, "cached download is larger than expected ({size} > {expected} bytes)"),
            Self::RemoteChanged {
                fresh,
                ..
            } => write!(f, "a newer build is available ({} bytes)", fresh.content_length),
            Self::UpToDate => write!(f, "cached download is up to date"),
        }
    }
}

/// Decide whether `artifact` must be fetched from `url`.
///
/// Local checks run first and the remote is only consulted once the cache
/// looks complete. A failed remote lookup is treated as up to date: a
/// complete cache is not thrown away because the network is flaky.
///
/// # Errors
///
/// Only local I/O failures (other than a missing file) are returned.
pub async fn needs_download<M: MetadataResolver>(
    artifact: &CachedArtifact,
    url: &str,
    resolver: &M,
) -> Result<DownloadDecision> {
    let Some(size) = artifact.size()? else {
        return Ok(DownloadDecision::NoCachedFile);
    };

    let saved = match artifact.saved_metadata().await {
        Ok(Some(saved)) => saved,
        Ok(None) => return Ok(DownloadDecision::NoSavedMetadata),
        Err(e) => {
            warn!("Ignoring unusable metadata: {:#}", e);
            return Ok(DownloadDecision::NoSavedMetadata);
        }
    };

    if size < saved.content_length {
        return Ok(DownloadDecision::Incomplete {
            offset: size,
            expected: saved.content_length,
        });
    }
    if size > saved.content_length {
        return Ok(DownloadDecision::Oversized {
            size,
            expected: saved.content_length,
        });
    }

    let fresh = match resolver.resolve(url).await {
        Ok(fresh) => fresh,
        Err(e) => {
            warn!("Could not check for updates ({}), keeping the cached download", e);
            return Ok(DownloadDecision::UpToDate);
        }
    };

    if fresh.is_equivalent(&saved) {
        debug!("Cached download matches remote ({} bytes)", size);
        return Ok(DownloadDecision::UpToDate);
    }

    let offset = if size < fresh.content_length { size } else { 0 };
    Ok(DownloadDecision::RemoteChanged {
        offset,
        fresh,
    })
}
