//! Remote artifact metadata and its on-disk sidecar.
//!
//! The sidecar is a four-line `KEY=value` record stored next to the cached
//! artifact:
//!
//! ```text
//! CONTENT_LENGTH=500000000
//! LAST_MODIFIED=Tue, 14 Oct 2025 09:12:00 GMT
//! ETAG="5f3c-9a1b"
//! TIMESTAMP=1760433120
//! ```
//!
//! Lines are split on the first `=` and the value is taken verbatim. Nothing
//! in the file is ever evaluated.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, LAST_MODIFIED};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::USER_AGENT;
use crate::core::AppupError;
use crate::registry::ResourceRegistry;
use crate::utils::fs::atomic_write;

/// Snapshot of the remote artifact at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Body size in bytes, 0 when the server did not say
    pub content_length: u64,
    /// Opaque `Last-Modified` value, empty when absent
    pub last_modified: String,
    /// Opaque `ETag` value, empty when absent
    pub etag: String,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl RemoteMetadata {
    /// Snapshot captured now.
    pub fn new(content_length: u64, last_modified: impl Into<String>, etag: impl Into<String>) -> Self {
        Self {
            content_length,
            last_modified: last_modified.into(),
            etag: etag.into(),
            captured_at: Utc::now(),
        }
    }

    /// Whether `other` describes the same remote artifact.
    ///
    /// Only the length and `Last-Modified` take part; the etag is recorded
    /// but not compared.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.content_length == other.content_length && self.last_modified == other.last_modified
    }

    /// Serialize to the sidecar format.
    pub fn to_sidecar(&self) -> String {
        format!(
            "CONTENT_LENGTH={}\nLAST_MODIFIED={}\nETAG={}\nTIMESTAMP={}\n",
            self.content_length,
            sanitize(&self.last_modified),
            sanitize(&self.etag),
            self.captured_at.timestamp()
        )
    }

    /// Parse the sidecar format.
    ///
    /// `CONTENT_LENGTH` is required; the other keys default to empty (and the
    /// epoch for `TIMESTAMP`). Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Fails on a missing or non-numeric `CONTENT_LENGTH`, an invalid
    /// `TIMESTAMP`, or a non-empty line without `=`.
    pub fn parse_sidecar(text: &str) -> Result<Self> {
        let mut content_length = None;
        let mut last_modified = String::new();
        let mut etag = String::new();
        let mut captured_at = DateTime::<Utc>::UNIX_EPOCH;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .with_context(|| format!("Malformed metadata line: {line:?}"))?;
            match key.trim() {
                "CONTENT_LENGTH" => {
                    content_length = Some(
                        value
                            .trim()
                            .parse::<u64>()
                            .with_context(|| format!("Invalid CONTENT_LENGTH: {value:?}"))?,
                    );
                }
                "LAST_MODIFIED" => last_modified = value.to_string(),
                "ETAG" => etag = value.to_string(),
                "TIMESTAMP" => {
                    let secs = value
                        .trim()
                        .parse::<i64>()
                        .with_context(|| format!("Invalid TIMESTAMP: {value:?}"))?;
                    captured_at = DateTime::from_timestamp(secs, 0)
                        .with_context(|| format!("TIMESTAMP out of range: {secs}"))?;
                }
                other => debug!("Ignoring unknown metadata key {}", other),
            }
        }

        Ok(Self {
            content_length: content_length.context("Metadata is missing CONTENT_LENGTH")?,
            last_modified,
            etag,
            captured_at,
        })
    }

    /// Read the sidecar at `path`. `Ok(None)` when it does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse_sidecar(&text)
                .with_context(|| format!("Failed to parse metadata file {}", path.display()))
                .map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read metadata file {}", path.display()))
            }
        }
    }

    /// Write the sidecar to `path` atomically.
    pub async fn save(&self, path: &Path, registry: &ResourceRegistry) -> Result<()> {
        let path = path.to_path_buf();
        let content = self.to_sidecar();
        let registry = registry.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, content.as_bytes(), &registry))
            .await
            .context("Metadata write task panicked")?
    }

    /// Build a snapshot from response headers. Missing or unparseable headers
    /// degrade to `0` / empty.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(sanitize)
                .unwrap_or_default()
        };
        let content_length = text(CONTENT_LENGTH).trim().parse().unwrap_or(0);
        Self::new(content_length, text(LAST_MODIFIED), text(ETAG))
    }
}

fn sanitize(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect::<String>().trim().to_string()
}

/// Fetches a [`RemoteMetadata`] snapshot without downloading the body.
pub trait MetadataResolver: Send + Sync {
    /// Resolve the current metadata for `url`.
    ///
    /// # Errors
    ///
    /// [`AppupError::NetworkError`] only when no response was received.
    fn resolve(&self, url: &str) -> impl Future<Output = Result<RemoteMetadata, AppupError>> + Send;
}

/// Resolves metadata with an HTTP `HEAD` request.
#[derive(Debug, Clone)]
pub struct HttpMetadataResolver {
    client: reqwest::Client,
}

impl HttpMetadataResolver {
    /// Create a resolver whose requests time out after `timeout`.
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
        })
    }
}

impl MetadataResolver for HttpMetadataResolver {
    async fn resolve(&self, url: &str) -> Result<RemoteMetadata, AppupError> {
        debug!("HEAD {}", url);
        let response =
            self.client.head(url).send().await.map_err(|e| AppupError::NetworkError {
                operation: format!("HEAD {url}"),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("HEAD {} returned {}, using whatever headers it sent", url, status);
        }
        let metadata = RemoteMetadata::from_headers(response.headers());
        debug!(
            "Remote metadata: length={} last_modified={:?} etag={:?}",
            metadata.content_length, metadata.last_modified, metadata.etag
        );
        Ok(metadata)
    }
}
