//! Ranged fetching against a mock artifact server.

use appup_cli::core::AppupError;
use appup_cli::download::{FetchOptions, HttpMetadataResolver, MetadataResolver, ResumableFetcher};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{ArtifactResponder, ETAG, LAST_MODIFIED, ROUTE, artifact_url, deb_payload};

fn options(max_attempts: u32) -> FetchOptions {
    FetchOptions {
        timeout: Duration::from_secs(30),
        connect_timeout: Duration::from_secs(5),
        max_attempts,
        retry_delay: Duration::ZERO,
        show_progress: false,
    }
}

#[tokio::test]
async fn test_fresh_fetch_sends_no_range() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(300_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("downloads").join("app.deb");
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, None, 300_000).await.unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.bytes, 300_000);
    assert_eq!(report.resumed_from, 0);
    assert_eq!(std::fs::read(&dest).unwrap(), responder.body());
    assert_eq!(responder.ranges(), vec![None]);
}

#[tokio::test]
async fn test_resume_requests_only_the_remainder() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(500_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    std::fs::write(&dest, &responder.body()[..200_000]).unwrap();
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, Some(200_000), 500_000).await.unwrap();

    assert_eq!(report.resumed_from, 200_000);
    assert_eq!(responder.ranges(), vec![Some("bytes=200000-".to_string())]);
    assert_eq!(std::fs::read(&dest).unwrap(), responder.body());
}

#[tokio::test]
async fn test_start_offset_is_clamped_to_disk() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(100_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    std::fs::write(&dest, &responder.body()[..50_000]).unwrap();
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, Some(80_000), 100_000).await.unwrap();

    assert_eq!(report.resumed_from, 50_000);
    assert_eq!(responder.ranges(), vec![Some("bytes=50000-".to_string())]);
    assert_eq!(std::fs::read(&dest).unwrap(), responder.body());
}

#[tokio::test]
async fn test_short_transfers_resume_on_each_retry() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(300_000)).truncate_first(2, 100_000);
    responder.mount(&server, Some(3)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, None, 300_000).await.unwrap();

    assert_eq!(report.attempts, 3);
    assert_eq!(
        responder.ranges(),
        vec![None, Some("bytes=100000-".to_string()), Some("bytes=200000-".to_string())]
    );
    assert_eq!(std::fs::read(&dest).unwrap(), responder.body());
}

#[tokio::test]
async fn test_attempt_budget_is_exact() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(100_000)).truncate_first(usize::MAX, 10);
    // Dropping the server asserts that no fourth request was made.
    responder.mount(&server, Some(3)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let err = fetcher.fetch(&artifact_url(&server), &dest, None, 100_000).await.unwrap_err();

    match err {
        AppupError::DownloadFailed {
            attempts,
            received,
            expected,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(received, 30);
            assert_eq!(expected, 100_000);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The partial stays on disk; discarding it is the registry's job.
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 30);
}

#[tokio::test]
async fn test_single_attempt_budget() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(10_000)).truncate_first(usize::MAX, 10);
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let fetcher = ResumableFetcher::new(options(1)).unwrap();

    let err = fetcher
        .fetch(&artifact_url(&server), &temp.path().join("app.deb"), None, 10_000)
        .await
        .unwrap_err();
    assert!(matches!(err, AppupError::DownloadFailed { attempts: 1, .. }));
}

#[tokio::test]
async fn test_server_errors_count_as_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let err = fetcher.fetch(&artifact_url(&server), &dest, None, 1_000).await.unwrap_err();
    assert!(matches!(
        err,
        AppupError::DownloadFailed {
            attempts: 3,
            received: 0,
            ..
        }
    ));
}

#[tokio::test]
async fn test_slow_server_exhausts_attempts_on_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(deb_payload(1_000)).set_delay(Duration::from_secs(3)))
        .expect(2)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let fetcher = ResumableFetcher::new(FetchOptions {
        timeout: Duration::from_millis(300),
        ..options(2)
    })
    .unwrap();

    let err = fetcher
        .fetch(&artifact_url(&server), &temp.path().join("app.deb"), None, 1_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppupError::DownloadFailed {
            attempts: 2,
            received: 0,
            ..
        }
    ));
}

#[tokio::test]
async fn test_timed_out_attempt_is_retried() {
    let server = MockServer::start().await;
    let payload = deb_payload(20_000);
    Mock::given(method("GET"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()).set_delay(Duration::from_secs(3)))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    let fetcher = ResumableFetcher::new(FetchOptions {
        timeout: Duration::from_millis(300),
        ..options(2)
    })
    .unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, None, 20_000).await.unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
}

#[tokio::test]
async fn test_truncated_full_response_resumes_with_range() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(60_000)).truncate_first(1, 25_000);
    responder.mount(&server, Some(2)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    let fetcher = ResumableFetcher::new(options(2)).unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, None, 60_000).await.unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.resumed_from, 0);
    assert_eq!(responder.ranges(), vec![None, Some("bytes=25000-".to_string())]);
    assert_eq!(std::fs::read(&dest).unwrap(), responder.body());
}

#[tokio::test]
async fn test_server_ignoring_range_rewrites_from_start() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(200_000)).ignoring_range();
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    // Stale bytes that would corrupt the file if appended to.
    std::fs::write(&dest, vec![0u8; 80_000]).unwrap();
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, Some(80_000), 200_000).await.unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(responder.ranges(), vec![Some("bytes=80000-".to_string())]);
    assert_eq!(std::fs::read(&dest).unwrap(), responder.body());
}

#[tokio::test]
async fn test_complete_file_is_not_refetched() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(50_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("app.deb");
    std::fs::write(&dest, responder.body()).unwrap();
    let fetcher = ResumableFetcher::new(options(3)).unwrap();

    let report = fetcher.fetch(&artifact_url(&server), &dest, Some(50_000), 50_000).await.unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(responder.ranges(), vec![Some("bytes=50000-".to_string())]);
    assert_eq!(std::fs::read(&dest).unwrap(), responder.body());
}

#[tokio::test]
async fn test_resolver_reads_head_headers() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(123_456));
    responder.mount(&server, Some(0)).await;

    let resolver = HttpMetadataResolver::new(Duration::from_secs(5), Duration::from_secs(30)).unwrap();
    let metadata = resolver.resolve(&artifact_url(&server)).await.unwrap();

    assert_eq!(metadata.content_length, 123_456);
    assert_eq!(metadata.last_modified, LAST_MODIFIED);
    assert_eq!(metadata.etag, ETAG);
}

#[tokio::test]
async fn test_resolver_gives_up_on_slow_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let resolver = HttpMetadataResolver::new(Duration::from_secs(5), Duration::from_millis(300)).unwrap();
    let err = resolver.resolve(&artifact_url(&server)).await.unwrap_err();

    assert!(matches!(err, AppupError::NetworkError { .. }));
}

#[tokio::test]
async fn test_resolver_tolerates_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolver = HttpMetadataResolver::new(Duration::from_secs(5), Duration::from_secs(30)).unwrap();
    let metadata = resolver.resolve(&artifact_url(&server)).await.unwrap();

    assert_eq!(metadata.content_length, 0);
    assert!(metadata.last_modified.is_empty());
}
