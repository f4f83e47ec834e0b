//! End-to-end update runs with fake collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rpp_cli::core::RppError;
use rpp_cli::pipeline::{
    Orchestrator, ProgressEvent, RestartPlan, RunFailure, RunGuard, Severity, Stage, UpdateRequest,
};
use rpp_cli::test_utils::fakes::{FakeSource, FakeStorage, HostCall, RecordingHost};
use rpp_cli::test_utils::fixtures::{
    read_entries, sample_zipball, zipball_with_escaping_entry, zipball_without_marker,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

const ORIGINAL_PROPERTIES: &str = "\
# Minecraft server properties
motd=A Minecraft Server
resource-pack=
resource-pack-sha1=
max-players=20
";

struct Server {
    _temp: TempDir,
    descriptor: PathBuf,
    work_dir: PathBuf,
}

impl Server {
    fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let descriptor = temp.path().join("server.properties");
        std::fs::write(&descriptor, ORIGINAL_PROPERTIES)?;
        let work_dir = temp.path().join("work");
        Ok(Self {
            descriptor,
            work_dir,
            _temp: temp,
        })
    }

    fn descriptor_text(&self) -> String {
        std::fs::read_to_string(&self.descriptor).unwrap()
    }

    fn leftover_workspaces(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.work_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("resourcepack-"))
            .collect()
    }
}

fn request() -> UpdateRequest {
    UpdateRequest {
        repository: "https://github.com/acme/pack".to_string(),
        branch: "main".to_string(),
        requested_by: "tester".to_string(),
        publish_path: "/survival".to_string(),
    }
}

fn wire(
    server: &Server,
    source: Arc<FakeSource>,
    storage: Arc<FakeStorage>,
) -> (Orchestrator, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(256);
    (Orchestrator::new(source, storage, &server.descriptor, &server.work_dir, tx), rx)
}

fn drain(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn stage_error(failure: &RunFailure) -> Option<&RppError> {
    failure.error.downcast_ref::<RppError>()
}

fn is_lower_hex_sha1(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[tokio::test]
async fn test_successful_update_publishes_and_rewrites_descriptor() -> Result<()> {
    rpp_cli::test_utils::init_test_logging(None);

    let server = Server::new()?;
    let source = Arc::new(FakeSource::serving(sample_zipball()));
    let storage = Arc::new(FakeStorage::new());
    storage.seed_folder("/survival", &["Resourcepack-old.zip"]);

    let (orchestrator, rx) = wire(&server, source.clone(), storage.clone());
    let outcome = orchestrator.run(request()).await?;

    // Artifact
    assert!(is_lower_hex_sha1(&outcome.artifact.digest));
    assert_eq!(outcome.extracted_files, Some(3));
    assert!(outcome.restart.is_none());

    // Remote folder holds only the new artifact
    let entries = storage.folder_entries("/survival");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0], outcome.location.remote_path);
    assert!(outcome.location.remote_path.starts_with("/survival/Resourcepack-"));
    assert!(outcome.location.remote_path.ends_with(".zip"));

    // Uploaded archive has the pack at its root
    let uploaded = storage.uploaded(&outcome.location.remote_path).expect("artifact uploaded");
    let check = TempDir::new()?;
    let artifact = check.path().join("artifact.zip");
    std::fs::write(&artifact, &uploaded)?;
    let names: Vec<String> = read_entries(&artifact).into_iter().map(|e| e.name).collect();
    assert!(names.contains(&"pack.mcmeta".to_string()));
    assert!(names.contains(&"assets/a.png".to_string()));
    assert!(names.contains(&"README.md".to_string()));
    assert!(names.iter().all(|n| !n.starts_with("repo-abc123")));

    // Descriptor points at the direct link and keeps everything else
    assert!(outcome.location.direct_url.ends_with("dl=1"));
    let text = server.descriptor_text();
    let descriptor = rpp_cli::descriptor::DeploymentDescriptor::load(&server.descriptor).await?;
    assert_eq!(descriptor.artifact_url(), Some(outcome.location.direct_url.as_str()));
    assert_eq!(descriptor.artifact_digest(), Some(outcome.artifact.digest.as_str()));
    assert!(text.starts_with("# Minecraft server properties\nmotd=A Minecraft Server\n"));
    assert!(text.ends_with("max-players=20\n"));

    // Workspace removed, source downloaded once
    assert!(server.leftover_workspaces().is_empty());
    assert_eq!(source.calls().download, 1);

    let events = drain(rx);
    assert_eq!(events.first().map(|e| e.stage), Some(Stage::Validating));
    assert_eq!(events.last().map(|e| e.stage), Some(Stage::ScheduledRestart));
    assert!(events.iter().all(|e| e.severity != Severity::Error));
    Ok(())
}

#[tokio::test]
async fn test_missing_source_credential_makes_no_remote_calls() -> Result<()> {
    let server = Server::new()?;
    let source = Arc::new(FakeSource::serving(sample_zipball()).without_credential());
    let storage = Arc::new(FakeStorage::new());

    let (orchestrator, rx) = wire(&server, source.clone(), storage.clone());
    let failure = orchestrator.run(request()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Validating);
    assert!(matches!(stage_error(&failure), Some(RppError::PreconditionMissing { .. })));
    assert_eq!(source.calls().download, 0);
    assert_eq!(storage.calls().total(), 0);
    assert_eq!(server.descriptor_text(), ORIGINAL_PROPERTIES);

    let events = drain(rx);
    assert!(events.iter().any(|e| e.severity == Severity::Error && e.stage == Stage::Validating));
    Ok(())
}

#[tokio::test]
async fn test_missing_storage_credential_and_publish_path() -> Result<()> {
    let server = Server::new()?;

    let storage = Arc::new(FakeStorage::new().without_credential());
    let (orchestrator, _rx) =
        wire(&server, Arc::new(FakeSource::serving(sample_zipball())), storage.clone());
    let failure = orchestrator.run(request()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Validating);
    match stage_error(&failure) {
        Some(RppError::PreconditionMissing { hint, .. }) => {
            assert!(hint.starts_with("rpp dropbox"))
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let storage = Arc::new(FakeStorage::new());
    let (orchestrator, _rx) =
        wire(&server, Arc::new(FakeSource::serving(sample_zipball())), storage.clone());
    let failure = orchestrator
        .run(UpdateRequest {
            publish_path: "  ".to_string(),
            ..request()
        })
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Validating);
    assert_eq!(storage.calls().total(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unparseable_repository_fails_validation() -> Result<()> {
    let server = Server::new()?;
    let source = Arc::new(FakeSource::serving(sample_zipball()));
    let (orchestrator, _rx) = wire(&server, source.clone(), Arc::new(FakeStorage::new()));

    let failure = orchestrator
        .run(UpdateRequest {
            repository: "not a repository".to_string(),
            ..request()
        })
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Validating);
    assert!(matches!(stage_error(&failure), Some(RppError::ParseFailure { .. })));
    assert_eq!(source.calls().download, 0);
    Ok(())
}

#[tokio::test]
async fn test_download_failure_leaves_descriptor_and_cleans_up() -> Result<()> {
    let server = Server::new()?;
    let source = Arc::new(FakeSource::serving(Vec::new()).failing_download(|url| {
        RppError::NotFound {
            url: url.to_string(),
            body: "Not Found".to_string(),
        }
    }));
    let storage = Arc::new(FakeStorage::new());

    let (orchestrator, _rx) = wire(&server, source, storage.clone());
    let failure = orchestrator.run(request()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::FetchingSource);
    assert!(matches!(stage_error(&failure), Some(RppError::NotFound { .. })));
    assert_eq!(storage.calls().total(), 0);
    assert_eq!(server.descriptor_text(), ORIGINAL_PROPERTIES);
    assert!(server.leftover_workspaces().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_archive_without_marker_fails_repackaging() -> Result<()> {
    let server = Server::new()?;
    let storage = Arc::new(FakeStorage::new());
    let (orchestrator, _rx) =
        wire(&server, Arc::new(FakeSource::serving(zipball_without_marker())), storage.clone());

    let failure = orchestrator.run(request()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Repackaging);
    assert!(matches!(stage_error(&failure), Some(RppError::NoRootMarkerFound { .. })));
    assert_eq!(storage.calls().uploads, 0);
    assert_eq!(server.descriptor_text(), ORIGINAL_PROPERTIES);
    assert!(server.leftover_workspaces().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_upload_failure_leaves_descriptor_unchanged() -> Result<()> {
    let server = Server::new()?;
    let storage = Arc::new(FakeStorage::new().failing_uploads());
    let (orchestrator, _rx) =
        wire(&server, Arc::new(FakeSource::serving(sample_zipball())), storage.clone());

    let failure = orchestrator.run(request()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Uploading);
    assert!(failure.to_string().starts_with("Update failed while uploading the artifact"));
    assert_eq!(storage.calls().link_creates, 0);
    assert_eq!(server.descriptor_text(), ORIGINAL_PROPERTIES);
    assert!(server.leftover_workspaces().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_undeletable_old_file_is_a_warning() -> Result<()> {
    let server = Server::new()?;
    let storage = Arc::new(FakeStorage::new().with_page_size(1));
    storage.seed_folder("/survival", &["a.zip", "b.zip", "c.zip"]);
    storage.fail_delete_of("/survival/b.zip");

    let (orchestrator, rx) =
        wire(&server, Arc::new(FakeSource::serving(sample_zipball())), storage.clone());
    let outcome = orchestrator.run(request()).await?;

    let entries = storage.folder_entries("/survival");
    assert_eq!(entries, vec!["/survival/b.zip".to_string(), outcome.location.remote_path.clone()]);
    assert_eq!(storage.calls().deletes, 3);

    let events = drain(rx);
    assert!(
        events.iter().any(|e| e.stage == Stage::Clearing && e.severity == Severity::Warning)
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_descriptor_fails_at_metadata_stage() -> Result<()> {
    let server = Server::new()?;
    std::fs::remove_file(&server.descriptor)?;
    let storage = Arc::new(FakeStorage::new());
    let (orchestrator, _rx) =
        wire(&server, Arc::new(FakeSource::serving(sample_zipball())), storage.clone());

    let failure = orchestrator.run(request()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::WritingMetadata);
    assert!(matches!(stage_error(&failure), Some(RppError::DescriptorNotFound { .. })));
    assert!(!server.descriptor.exists());
    assert!(server.leftover_workspaces().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() -> Result<()> {
    let server = Server::new()?;
    let _held = RunGuard::try_acquire(&server.work_dir).await?;

    let source = Arc::new(FakeSource::serving(sample_zipball()));
    let (orchestrator, _rx) = wire(&server, source.clone(), Arc::new(FakeStorage::new()));
    let failure = orchestrator.run(request()).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Validating);
    assert!(matches!(stage_error(&failure), Some(RppError::RunInProgress { .. })));
    assert_eq!(source.calls().download, 0);
    Ok(())
}

#[tokio::test]
async fn test_lock_is_released_after_run() -> Result<()> {
    let server = Server::new()?;
    let (orchestrator, _rx) = wire(
        &server,
        Arc::new(FakeSource::serving(sample_zipball())),
        Arc::new(FakeStorage::new()),
    );
    orchestrator.run(request()).await?;

    let guard = RunGuard::try_acquire(&server.work_dir).await?;
    assert!(guard.path().ends_with(".update.lock"));
    Ok(())
}

#[tokio::test]
async fn test_restart_is_scheduled_after_success() -> Result<()> {
    let server = Server::new()?;
    let host = Arc::new(RecordingHost::new());
    let (orchestrator, _rx) = wire(
        &server,
        Arc::new(FakeSource::serving(sample_zipball())),
        Arc::new(FakeStorage::new()),
    );
    let orchestrator = orchestrator.with_restart(
        host.clone(),
        RestartPlan {
            announce: true,
            delay: Duration::from_millis(20),
        },
    );

    let outcome = orchestrator.run(request()).await?;
    outcome.restart.expect("restart scheduled").await?;

    let calls = host.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], HostCall::Broadcast(m) if m.starts_with("Server will restart in")));
    assert_eq!(calls[2], HostCall::Shutdown);
    Ok(())
}

#[tokio::test]
async fn test_failed_run_never_restarts() -> Result<()> {
    let server = Server::new()?;
    let host = Arc::new(RecordingHost::new());
    let (orchestrator, _rx) = wire(
        &server,
        Arc::new(FakeSource::serving(sample_zipball())),
        Arc::new(FakeStorage::new().failing_uploads()),
    );
    let orchestrator = orchestrator.with_restart(
        host.clone(),
        RestartPlan {
            announce: true,
            delay: Duration::from_millis(1),
        },
    );

    assert!(orchestrator.run(request()).await.is_err());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(host.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_extraction_is_only_a_warning() -> Result<()> {
    let server = Server::new()?;
    let source = Arc::new(FakeSource::serving(zipball_with_escaping_entry()));
    let storage = Arc::new(FakeStorage::new());

    let (orchestrator, rx) = wire(&server, source, storage.clone());
    let outcome = orchestrator.run(request()).await?;

    assert_eq!(outcome.extracted_files, None);
    assert!(storage.uploaded(&outcome.location.remote_path).is_some());
    let descriptor = rpp_cli::descriptor::DeploymentDescriptor::load(&server.descriptor).await?;
    assert_eq!(descriptor.artifact_url(), Some(outcome.location.direct_url.as_str()));
    assert_eq!(descriptor.artifact_digest(), Some(outcome.artifact.digest.as_str()));
    assert!(server.leftover_workspaces().is_empty());

    let events = drain(rx);
    assert!(events.iter().any(|e| e.stage == Stage::Extracting && e.severity == Severity::Warning));
    assert!(events.iter().all(|e| e.severity != Severity::Error));
    Ok(())
}

#[tokio::test]
async fn test_cleanup_failure_does_not_fail_the_run() -> Result<()> {
    let server = Server::new()?;
    let work_dir = server.work_dir.clone();
    // Swap the workspace directory for a plain file once the artifact is linked.
    let storage = Arc::new(FakeStorage::new().on_link(move |_| {
        for entry in std::fs::read_dir(&work_dir).unwrap().filter_map(|e| e.ok()) {
            if entry.file_name().to_string_lossy().starts_with("resourcepack-") {
                std::fs::remove_dir_all(entry.path()).unwrap();
                std::fs::write(entry.path(), b"not a directory").unwrap();
            }
        }
    }));

    let source = Arc::new(FakeSource::serving(sample_zipball()));
    let (orchestrator, rx) = wire(&server, source, storage);
    let outcome = orchestrator.run(request()).await?;

    let descriptor = rpp_cli::descriptor::DeploymentDescriptor::load(&server.descriptor).await?;
    assert_eq!(descriptor.artifact_url(), Some(outcome.location.direct_url.as_str()));
    assert_eq!(server.leftover_workspaces().len(), 1);

    let events = drain(rx);
    assert!(events.iter().any(|e| e.stage == Stage::CleaningUp && e.severity == Severity::Warning));
    assert!(events.iter().all(|e| e.severity != Severity::Error));
    assert_eq!(events.last().map(|e| e.stage), Some(Stage::ScheduledRestart));
    Ok(())
}

#[tokio::test]
async fn test_failure_event_carries_error_kind() -> Result<()> {
    let server = Server::new()?;
    let source = Arc::new(FakeSource::serving(zipball_without_marker()));
    let (orchestrator, rx) = wire(&server, source, Arc::new(FakeStorage::new()));

    let failure = orchestrator.run(request()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Repackaging);

    let events = drain(rx);
    let reported: Vec<_> = events.iter().filter(|e| e.severity == Severity::Error).collect();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].stage, Stage::Repackaging);
    assert_eq!(reported[0].kind, Some("NoRootMarkerFound"));
    assert!(events.iter().filter(|e| e.severity != Severity::Error).all(|e| e.kind.is_none()));
    Ok(())
}
