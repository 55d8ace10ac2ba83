//! Resumable, retrying artifact download.
//!
//! Each attempt asks for `Range: bytes=<offset>-`, where the offset is the
//! number of bytes already on disk, and appends the body. Attempts repeat
//! with a fixed delay until the file holds exactly the expected number of
//! bytes or the attempt budget runs out. Connection errors, timeouts, bad
//! status codes and short bodies are all handled the same way: the next
//! offset is recomputed from whatever landed on disk.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::header::RANGE;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_DELAY_SECS, USER_AGENT,
};
use crate::core::AppupError;
use crate::utils::fs::{ensure_dir, file_len};
use crate::utils::progress::ProgressBar;

/// Tuning for [`ResumableFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound for one whole attempt
    pub timeout: Duration,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Draw a progress bar
    pub show_progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            show_progress: true,
        }
    }
}

/// Result of a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    /// Attempts used, at least 1
    pub attempts: u32,
    /// Final file size
    pub bytes: u64,
    /// Bytes that were already on disk before the first attempt
    pub resumed_from: u64,
}

/// Downloads one URL to one file with range-based resume.
#[derive(Debug, Clone)]
pub struct ResumableFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl ResumableFetcher {
    /// Create a fetcher.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(options.connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            options,
        })
    }

    /// Download `url` into `dest` until it holds `total_size` bytes.
    ///
    /// The first attempt starts at `start_offset` (0 when `None`), clamped to
    /// the bytes actually on disk. Later attempts start at the on-disk size and
    /// never move backwards unless the file has grown past `total_size`.
    ///
    /// # Errors
    ///
    /// - [`AppupError::NetworkError`] when `total_size` is 0 (nothing to verify against)
    /// - [`AppupError::DownloadFailed`] once `max_attempts` attempts have failed
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        start_offset: Option<u64>,
        total_size: u64,
    ) -> Result<FetchReport, AppupError> {
        if total_size == 0 {
            return Err(AppupError::NetworkError {
                operation: format!("GET {url}"),
                reason: "the server did not report the artifact size".to_string(),
            });
        }
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_dir(parent).map_err(|e| AppupError::IoError(std::io::Error::other(format!("{e:#}"))))?;
        }

        let on_disk = disk_size(dest);
        let first_offset = start_offset.unwrap_or(0).min(on_disk);
        let max_attempts = self.options.max_attempts.max(1);
        let strategy = FixedInterval::new(self.options.retry_delay).take(max_attempts as usize - 1);

        let bar = ProgressBar::download(total_size, self.options.show_progress);
        bar.set_prefix("Downloading");

        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let bar_ref = &bar;
        let result = Retry::spawn(strategy, || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                let offset = if n == 1 {
                    first_offset
                } else {
                    resume_offset(dest, total_size)
                };
                self.attempt(url, dest, offset, total_size, n, max_attempts, bar_ref).await
            }
        })
        .await;
        bar.finish_and_clear();

        let attempts = attempts.load(Ordering::SeqCst);
        match result {
            Ok(bytes) => {
                info!("Downloaded {} ({} bytes, {} attempt(s))", dest.display(), bytes, attempts);
                Ok(FetchReport {
                    attempts,
                    bytes,
                    resumed_from: first_offset,
                })
            }
            Err(reason) => {
                debug!("Giving up on {}: {}", url, reason);
                Err(AppupError::DownloadFailed {
                    url: url.to_string(),
                    attempts,
                    received: disk_size(dest),
                    expected: total_size,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        offset: u64,
        total_size: u64,
        attempt: u32,
        max_attempts: u32,
        bar: &ProgressBar,
    ) -> Result<u64, String> {
        debug!("Attempt {}/{}: GET {} from byte {}", attempt, max_attempts, url, offset);
        bar.set_position(offset);

        let outcome =
            tokio::time::timeout(self.options.timeout, self.transfer(url, dest, offset, total_size, bar))
                .await;

        let received = disk_size(dest);
        if received == total_size {
            return Ok(received);
        }

        let reason = match outcome {
            Ok(Ok(())) => format!("short transfer: {received} of {total_size} bytes"),
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {}s", self.options.timeout.as_secs()),
        };
        warn!("Download attempt {}/{} failed: {}", attempt, max_attempts, reason);
        Err(reason)
    }

    async fn transfer(
        &self,
        url: &str,
        dest: &Path,
        offset: u64,
        total_size: u64,
        bar: &ProgressBar,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dest)
            .await
            .with_context(|| format!("Failed to open {}", dest.display()))?;
        file.set_len(offset).await.context("Failed to truncate partial download")?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let mut response = request.send().await.with_context(|| format!("GET {url} failed"))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK if offset > 0 => {
                warn!("Server ignored the range request, restarting from byte 0");
                file.set_len(0).await?;
                file.seek(SeekFrom::Start(0)).await?;
                bar.set_position(0);
            }
            StatusCode::OK => {}
            StatusCode::RANGE_NOT_SATISFIABLE if offset == total_size => {
                debug!("Server reports nothing left to send");
                return Ok(());
            }
            status => anyhow::bail!("GET {url} returned {status}"),
        }

        let streamed = stream_body(&mut response, &mut file, bar).await;
        file.flush().await.context("Failed to flush download")?;
        streamed
    }
}

async fn stream_body(response: &mut reqwest::Response, file: &mut File, bar: &ProgressBar) -> Result<()> {
    while let Some(chunk) = response.chunk().await.context("Connection lost mid-transfer")? {
        file.write_all(&chunk).await.context("Failed to write download chunk")?;
        bar.inc(chunk.len() as u64);
    }
    Ok(())
}

fn disk_size(path: &Path) -> u64 {
    file_len(path).ok().flatten().unwrap_or(0)
}

fn resume_offset(dest: &Path, total_size: u64) -> u64 {
    let size = disk_size(dest);
    if size > total_size { 0 } else { size }
}
