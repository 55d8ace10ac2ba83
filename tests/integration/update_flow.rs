//! End-to-end pipeline runs with a recording package manager.

use appup_cli::config::AppupConfig;
use appup_cli::core::{AppupError, exit_code_for};
use appup_cli::download::{DownloadDecision, HttpMetadataResolver};
use appup_cli::installer::{InstallReport, PackageFamily};
use appup_cli::pipeline::{Pipeline, PipelineOutcome, RunOptions};
use appup_cli::registry::{CleanupScope, ResourceRegistry};
use appup_cli::test_utils::RecordingRunner;
use appup_cli::utils::process::CommandOutcome;
use tempfile::TempDir;
use wiremock::MockServer;

use crate::common::{
    ArtifactResponder, LAST_MODIFIED, artifact_path, artifact_url, deb_payload, read_sidecar, seed_cache,
    sidecar_path, test_config, test_registry,
};

fn pipeline(
    config: &AppupConfig,
    registry: &ResourceRegistry,
    runner: &RecordingRunner,
) -> Pipeline<RecordingRunner, HttpMetadataResolver> {
    let resolver = config.metadata_resolver().unwrap();
    Pipeline::new(config.clone(), PackageFamily::Apt, registry.clone(), resolver, runner.clone())
}

fn quiet() -> RunOptions {
    RunOptions {
        quiet: true,
        ..RunOptions::default()
    }
}

/// Run under a cleanup scope, the way the CLI does.
async fn run_scoped(
    config: &AppupConfig,
    registry: &ResourceRegistry,
    runner: &RecordingRunner,
) -> anyhow::Result<PipelineOutcome> {
    let pipeline = pipeline(config, registry, runner);
    CleanupScope::enter(registry.clone()).run(async { pipeline.run(&quiet()).await }).await
}

#[tokio::test]
async fn test_fresh_download_installs_once() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(500_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    let outcome = run_scoped(&config, &registry, &runner).await.unwrap();

    assert_eq!(
        outcome,
        PipelineOutcome::Installed {
            downloaded: true,
            attempts: 1,
            install: InstallReport {
                install_attempts: 1,
                repaired: false,
            },
        }
    );
    assert_eq!(std::fs::read(artifact_path(&config)).unwrap(), responder.body());
    assert_eq!(
        runner.command_lines(),
        vec![format!("dpkg -i {}", artifact_path(&config).display())]
    );

    let saved = read_sidecar(&sidecar_path(&config));
    assert_eq!(saved.content_length, 500_000);
    assert_eq!(saved.last_modified, LAST_MODIFIED);

    // Success keeps the artifact and releases the lock.
    assert!(artifact_path(&config).exists());
    assert!(!config.lock_path().exists());
}

#[tokio::test]
async fn test_interrupted_download_resumes_at_offset() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(500_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    seed_cache(&config, &responder.body()[..200_000], 500_000, LAST_MODIFIED);
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    let decision = pipeline(&config, &registry, &runner).check(None).await.unwrap();
    assert_eq!(
        decision,
        DownloadDecision::Incomplete {
            offset: 200_000,
            expected: 500_000,
        }
    );

    let outcome = run_scoped(&config, &registry, &runner).await.unwrap();

    assert!(matches!(outcome, PipelineOutcome::Installed { downloaded: true, attempts: 1, .. }));
    assert_eq!(responder.ranges(), vec![Some("bytes=200000-".to_string())]);
    assert_eq!(std::fs::read(artifact_path(&config)).unwrap(), responder.body());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_current_cache_skips_download() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(64_000));
    responder.mount(&server, Some(0)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    seed_cache(&config, responder.body(), 64_000, LAST_MODIFIED);
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    let outcome = run_scoped(&config, &registry, &runner).await.unwrap();

    assert_eq!(
        outcome,
        PipelineOutcome::Installed {
            downloaded: false,
            attempts: 0,
            install: InstallReport {
                install_attempts: 1,
                repaired: false,
            },
        }
    );
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_remote_change_downloads_again() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(64_000)).last_modified("Thu, 02 Oct 2025 08:00:00 GMT");
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    seed_cache(&config, &vec![7u8; 64_000], 64_000, LAST_MODIFIED);
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    let outcome = run_scoped(&config, &registry, &runner).await.unwrap();

    assert!(matches!(outcome, PipelineOutcome::Installed { downloaded: true, .. }));
    // Same size on disk as remote: nothing is resumable.
    assert_eq!(responder.ranges(), vec![None]);
    assert_eq!(std::fs::read(artifact_path(&config)).unwrap(), responder.body());
    assert_eq!(read_sidecar(&sidecar_path(&config)).last_modified, "Thu, 02 Oct 2025 08:00:00 GMT");
}

#[tokio::test]
async fn test_dependency_repair_runs_once() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(32_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    let registry = test_registry(&temp);
    let runner = RecordingRunner::scripted([
        CommandOutcome::failed(1),
        CommandOutcome::SUCCESS,
        CommandOutcome::SUCCESS,
    ]);

    let outcome = run_scoped(&config, &registry, &runner).await.unwrap();

    assert!(matches!(
        outcome,
        PipelineOutcome::Installed {
            install: InstallReport {
                install_attempts: 2,
                repaired: true,
            },
            ..
        }
    ));
    let deb = artifact_path(&config);
    assert_eq!(
        runner.command_lines(),
        vec![
            format!("dpkg -i {}", deb.display()),
            "apt-get install -f -y".to_string(),
            format!("dpkg -i {}", deb.display()),
        ]
    );
}

#[tokio::test]
async fn test_failed_install_after_repair_is_terminal() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(32_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    let registry = test_registry(&temp);
    let runner = RecordingRunner::scripted([
        CommandOutcome::failed(1),
        CommandOutcome::SUCCESS,
        CommandOutcome::failed(1),
    ]);

    let err = run_scoped(&config, &registry, &runner).await.unwrap_err();

    assert_eq!(exit_code_for(&err), 5);
    assert!(matches!(err.downcast_ref::<AppupError>(), Some(AppupError::InstallFailed { .. })));
    assert_eq!(runner.calls().len(), 3);
    // A verified artifact is kept for the next attempt.
    assert!(artifact_path(&config).exists());
    assert!(!config.lock_path().exists());
}

#[tokio::test]
async fn test_failed_download_discards_small_partial() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(100_000)).truncate_first(usize::MAX, 1_000);
    responder.mount(&server, Some(3)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    let err = run_scoped(&config, &registry, &runner).await.unwrap_err();

    assert_eq!(exit_code_for(&err), 3);
    assert!(runner.calls().is_empty());
    assert!(!artifact_path(&config).exists());
    assert!(!config.lock_path().exists());
}

#[tokio::test]
async fn test_large_partial_survives_for_next_run() {
    let temp = TempDir::new().unwrap();
    let runner = RecordingRunner::new();

    let flaky = MockServer::start().await;
    let broken = ArtifactResponder::new(deb_payload(100_000)).truncate_first(usize::MAX, 10_000);
    broken.mount(&flaky, Some(3)).await;

    let mut config = test_config(&temp, &artifact_url(&flaky));
    config.partial_threshold = 1_000;

    let err = run_scoped(&config, &test_registry(&temp), &runner).await.unwrap_err();
    assert_eq!(exit_code_for(&err), 3);
    assert_eq!(std::fs::metadata(artifact_path(&config)).unwrap().len(), 30_000);

    let healthy = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(100_000));
    responder.mount(&healthy, Some(1)).await;
    config.app.deb_url = Some(artifact_url(&healthy));

    run_scoped(&config, &test_registry(&temp), &runner).await.unwrap();

    assert_eq!(responder.ranges(), vec![Some("bytes=30000-".to_string())]);
    assert_eq!(std::fs::read(artifact_path(&config)).unwrap(), responder.body());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_error_page_is_rejected_before_install() {
    let server = MockServer::start().await;
    let mut page = b"<!DOCTYPE html><html><body>Service unavailable</body></html>".to_vec();
    page.resize(4_096, b' ');
    let responder = ArtifactResponder::new(page);
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    let err = run_scoped(&config, &registry, &runner).await.unwrap_err();

    assert_eq!(exit_code_for(&err), 4);
    assert!(matches!(err.downcast_ref::<AppupError>(), Some(AppupError::FormatInvalid { .. })));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_force_discards_cache() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(20_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let config = test_config(&temp, &artifact_url(&server));
    seed_cache(&config, responder.body(), 20_000, LAST_MODIFIED);
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    let pipeline = pipeline(&config, &registry, &runner);
    let options = RunOptions {
        force: true,
        ..quiet()
    };
    let outcome = CleanupScope::enter(registry.clone())
        .run(async { pipeline.run(&options).await })
        .await
        .unwrap();

    assert!(matches!(outcome, PipelineOutcome::Installed { downloaded: true, .. }));
    assert_eq!(responder.ranges(), vec![None]);
}

#[tokio::test]
async fn test_backup_runs_before_install() {
    let server = MockServer::start().await;
    let responder = ArtifactResponder::new(deb_payload(20_000));
    responder.mount(&server, Some(1)).await;

    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp, &artifact_url(&server));
    config.backup_command = Some(temp.path().join("app-backup"));
    let registry = test_registry(&temp);
    let runner = RecordingRunner::new();

    run_scoped(&config, &registry, &runner).await.unwrap();

    let lines = runner.command_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], temp.path().join("app-backup").display().to_string());
    assert!(lines[1].starts_with("dpkg -i"));
}
