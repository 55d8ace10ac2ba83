//! Shared helpers: an artifact server that honours `Range` and fixture builders.

use appup_cli::config::AppupConfig;
use appup_cli::download::RemoteMetadata;
use appup_cli::installer::{PackageFamily, PackageFormat};
use appup_cli::registry::{CleanupPolicy, ResourceRegistry};
use appup_cli::test_utils::package_bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ROUTE: &str = "/releases/app.deb";
pub const LAST_MODIFIED: &str = "Wed, 01 Oct 2025 10:00:00 GMT";
pub const ETAG: &str = "\"v1\"";

/// Serves one artifact the way a CDN does: `HEAD` reports its size, `GET`
/// honours `bytes=N-` ranges with `206`.
///
/// Every `GET` is recorded together with its `Range` header.
#[derive(Clone)]
pub struct ArtifactResponder {
    body: Arc<Vec<u8>>,
    last_modified: String,
    truncate: Option<(usize, usize)>,
    ignore_range: bool,
    gets: Arc<AtomicUsize>,
    ranges: Arc<Mutex<Vec<Option<String>>>>,
}

impl ArtifactResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            last_modified: LAST_MODIFIED.to_string(),
            truncate: None,
            ignore_range: false,
            gets: Arc::default(),
            ranges: Arc::default(),
        }
    }

    pub fn last_modified(mut self, value: &str) -> Self {
        self.last_modified = value.to_string();
        self
    }

    /// Cut the first `count` GET responses down to `bytes` bytes each.
    pub fn truncate_first(mut self, count: usize, bytes: usize) -> Self {
        self.truncate = Some((count, bytes));
        self
    }

    /// Answer ranged requests with the full body and `200`.
    pub fn ignoring_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// `Range` header of each GET, in arrival order.
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.ranges.lock().unwrap().clone()
    }

    /// Mount HEAD and GET handlers for [`ROUTE`]. `expected_gets` is verified
    /// when the server is dropped.
    pub async fn mount(&self, server: &MockServer, expected_gets: Option<u64>) {
        Mock::given(method("HEAD"))
            .and(path(ROUTE))
            .respond_with(self.clone())
            .mount(server)
            .await;

        let get = Mock::given(method("GET")).and(path(ROUTE)).respond_with(self.clone());
        match expected_gets {
            Some(n) => get.expect(n).mount(server).await,
            None => get.mount(server).await,
        }
    }

    fn head(&self) -> ResponseTemplate {
        // The body is dropped on the wire for HEAD but sets Content-Length.
        ResponseTemplate::new(200)
            .insert_header("last-modified", self.last_modified.as_str())
            .insert_header("etag", ETAG)
            .set_body_bytes(self.body.as_slice())
    }

    fn get(&self, request: &Request) -> ResponseTemplate {
        let n = self.gets.fetch_add(1, Ordering::SeqCst);
        let range = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.ranges.lock().unwrap().push(range.clone());

        let len = self.body.len();
        let start = match range {
            Some(range) if !self.ignore_range => parse_range_start(&range),
            _ => 0,
        };
        if start >= len {
            return ResponseTemplate::new(416).insert_header("content-range", format!("bytes */{len}"));
        }

        let mut slice = &self.body[start..];
        if let Some((count, bytes)) = self.truncate
            && n < count
        {
            slice = &slice[..bytes.min(slice.len())];
        }

        let template = ResponseTemplate::new(if start > 0 { 206 } else { 200 })
            .insert_header("last-modified", self.last_modified.as_str())
            .insert_header("etag", ETAG)
            .set_body_bytes(slice.to_vec());
        if start > 0 {
            template.insert_header("content-range", format!("bytes {start}-{}/{len}", len - 1))
        } else {
            template
        }
    }
}

impl Respond for ArtifactResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if request.method.as_str() == "HEAD" {
            self.head()
        } else {
            self.get(request)
        }
    }
}

fn parse_range_start(range: &str) -> usize {
    range
        .strip_prefix("bytes=")
        .and_then(|spec| spec.split('-').next())
        .and_then(|start| start.parse().ok())
        .unwrap_or(0)
}

/// A `.deb` payload of `len` bytes.
pub fn deb_payload(len: usize) -> Vec<u8> {
    package_bytes(PackageFormat::Deb, len)
}

pub fn artifact_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), ROUTE)
}

/// Config rooted in `temp` that installs `.deb` packages without sudo and
/// retries immediately.
pub fn test_config(temp: &TempDir, url: &str) -> AppupConfig {
    let mut config = AppupConfig {
        download_dir: temp.path().join("downloads"),
        lock_path: Some(temp.path().join("run").join("appup.lock")),
        package_family: Some(PackageFamily::Apt),
        use_sudo: false,
        retry_delay: 0,
        max_attempts: 3,
        connect_timeout: 5,
        download_timeout: 30,
        ..AppupConfig::default()
    };
    config.app.deb_url = Some(url.to_string());
    config
}

pub fn test_registry(temp: &TempDir) -> ResourceRegistry {
    ResourceRegistry::new(CleanupPolicy {
        grace_period: Duration::from_millis(200),
        allowed_prefixes: vec![temp.path().to_path_buf()],
    })
}

pub fn artifact_path(config: &AppupConfig) -> PathBuf {
    config.download_dir.join("app.deb")
}

pub fn sidecar_path(config: &AppupConfig) -> PathBuf {
    config.download_dir.join("app.deb.metadata")
}

/// Seed the cache with `bytes` and a sidecar recording `content_length`.
pub fn seed_cache(config: &AppupConfig, bytes: &[u8], content_length: u64, last_modified: &str) {
    std::fs::create_dir_all(&config.download_dir).unwrap();
    std::fs::write(artifact_path(config), bytes).unwrap();
    let metadata = RemoteMetadata::new(content_length, last_modified, ETAG);
    std::fs::write(sidecar_path(config), metadata.to_sidecar()).unwrap();
}

pub fn read_sidecar(path: &Path) -> RemoteMetadata {
    RemoteMetadata::parse_sidecar(&std::fs::read_to_string(path).unwrap()).unwrap()
}
