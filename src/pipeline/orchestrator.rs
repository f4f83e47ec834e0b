//! The update state machine.
//!
//! ```text
//! Idle → Validating → FetchingSource → Repackaging → Extracting → Hashing
//!      → Clearing → Uploading → LinkResolving → WritingMetadata
//!      → CleaningUp → ScheduledRestart → Idle
//! ```
//!
//! Any stage can end the run as failed. `Validating` never touches the
//! network. Every later stage runs exactly one operation and, on failure,
//! the workspace is still removed before the failure is returned. Only a
//! failed `Extracting` is downgraded to a warning, since nothing downstream
//! reads the extracted tree.
//!
//! The deployment descriptor is written only after the artifact is uploaded
//! and linked, so an earlier failure leaves the previous artifact live.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::guard::RunGuard;
use super::restart::{HostControl, RestartPlan, schedule_restart};
use super::types::{ProgressEvent, RunFailure, RunOutcome, Stage, UpdateRequest};
use super::workspace::RunWorkspace;
use crate::archive;
use crate::checksum::{self, ArtifactDescriptor};
use crate::constants::ROOT_MARKER_FILE;
use crate::core::RppError;
use crate::descriptor;
use crate::publish::{PublishedLocation, Publisher, StorageBackend, remote_join};
use crate::source::{DownloadLocator, SourceRepository};

struct StageResults {
    artifact: ArtifactDescriptor,
    location: PublishedLocation,
    extracted_files: Option<usize>,
}

/// Runs one update from start to finish.
pub struct Orchestrator {
    source: Arc<dyn SourceRepository>,
    publisher: Publisher,
    descriptor_path: PathBuf,
    work_dir: PathBuf,
    restart: Option<(Arc<dyn HostControl>, RestartPlan)>,
    events: mpsc::Sender<ProgressEvent>,
}

impl Orchestrator {
    /// Wire the collaborators of one run.
    ///
    /// Progress is sent to `events`; a dropped receiver only silences it.
    pub fn new(
        source: Arc<dyn SourceRepository>,
        backend: Arc<dyn StorageBackend>,
        descriptor_path: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Self {
        Self {
            source,
            publisher: Publisher::new(backend),
            descriptor_path: descriptor_path.into(),
            work_dir: work_dir.into(),
            restart: None,
            events,
        }
    }

    /// Restart the host through `host` after a successful run.
    #[must_use]
    pub fn with_restart(mut self, host: Arc<dyn HostControl>, plan: RestartPlan) -> Self {
        self.restart = Some((host, plan));
        self
    }

    /// Execute the run described by `request`.
    pub async fn run(self, request: UpdateRequest) -> Result<RunOutcome, RunFailure> {
        info!(
            "Update requested by {}: {} @ {} -> {}",
            request.requested_by, request.repository, request.branch, request.publish_path
        );

        let (locator, guard) = match self.validate(&request).await {
            Ok(validated) => validated,
            Err(error) => return Err(self.fail(Stage::Validating, error).await),
        };

        let workspace = match RunWorkspace::create(&self.work_dir, Local::now()).await {
            Ok(workspace) => workspace,
            Err(error) => return Err(self.fail(Stage::FetchingSource, error).await),
        };
        debug!("Run workspace {}", workspace.root().display());

        let result = self.run_stages(&request, &locator, &workspace).await;

        if let Err(failure) = &result {
            self.emit(ProgressEvent::failure(failure.stage, &failure.error)).await;
            warn!(
                kind = error_kind(&failure.error),
                "Update failed while {}: {:#}",
                failure.stage.describe(),
                failure.error
            );
        }

        self.emit(ProgressEvent::info(Stage::CleaningUp, "Removing the run workspace…")).await;
        if let Err(warning) = workspace.remove().await {
            warn!("{}", warning);
            self.emit(ProgressEvent::warning(Stage::CleaningUp, warning.to_string())).await;
        }
        drop(guard);

        let results = result?;
        let restart = self.schedule_restart().await;

        Ok(RunOutcome {
            artifact: results.artifact,
            location: results.location,
            extracted_files: results.extracted_files,
            restart,
        })
    }

    async fn validate(&self, request: &UpdateRequest) -> Result<(DownloadLocator, RunGuard)> {
        self.emit(ProgressEvent::info(Stage::Validating, "Checking credentials…")).await;

        if !self.source.has_credential() {
            return Err(RppError::PreconditionMissing {
                what: format!("{} token", self.source.provider()),
                hint: "rpp github <token>".to_string(),
            }
            .into());
        }
        if !self.publisher.backend().has_credential() {
            return Err(RppError::PreconditionMissing {
                what: format!("{} credentials", self.publisher.backend().provider()),
                hint: "rpp dropbox <appKey> <appSecret>".to_string(),
            }
            .into());
        }
        if request.publish_path.trim().is_empty() {
            return Err(RppError::PreconditionMissing {
                what: "publish path".to_string(),
                hint: "rpp dropbox-path <path>".to_string(),
            }
            .into());
        }

        let locator = self.source.resolve_download_locator(&request.repository, &request.branch)?;
        self.emit(ProgressEvent::info(
            Stage::Validating,
            format!("Repository detected: {} (branch {})", locator.slug, locator.branch),
        ))
        .await;

        let guard = RunGuard::try_acquire(&self.work_dir).await?;
        Ok((locator, guard))
    }

    async fn run_stages(
        &self,
        request: &UpdateRequest,
        locator: &DownloadLocator,
        workspace: &RunWorkspace,
    ) -> Result<StageResults, RunFailure> {
        let download_path = workspace.download_path();
        let artifact_path = workspace.artifact_path();

        let fetching = format!("Downloading {} from {}…", locator.slug, self.source.provider());
        self.enter(Stage::FetchingSource, fetching).await;
        let bytes =
            attempt(Stage::FetchingSource, self.source.download(locator, &download_path)).await?;
        self.emit(ProgressEvent::info(Stage::FetchingSource, format!("Downloaded {bytes} bytes")))
            .await;

        self.enter(Stage::Repackaging, "Repackaging the archive…").await;
        let summary = attempt(Stage::Repackaging, {
            let input = download_path.clone();
            let output = artifact_path.clone();
            blocking(move || archive::repackage(&input, &output, ROOT_MARKER_FILE))
        })
        .await?;
        self.emit(ProgressEvent::info(
            Stage::Repackaging,
            format!(
                "Repackaged {} entries into {}",
                summary.entries_written,
                workspace.artifact_name()
            ),
        ))
        .await;

        self.enter(Stage::Extracting, "Extracting the artifact…").await;
        let extracted_files = self.extract(&artifact_path, &workspace.extract_dir()).await;

        self.enter(Stage::Hashing, "Calculating SHA-1…").await;
        let artifact = attempt(Stage::Hashing, checksum::describe(&artifact_path)).await?;
        self.emit(ProgressEvent::info(Stage::Hashing, format!("SHA-1: {}", artifact.digest))).await;

        self.enter(Stage::Clearing, format!("Clearing {} before upload…", request.publish_path))
            .await;
        let cleared =
            attempt(Stage::Clearing, self.publisher.clear_folder(&request.publish_path)).await?;
        if cleared.failed > 0 {
            self.emit(ProgressEvent::warning(
                Stage::Clearing,
                format!("{} old file(s) could not be deleted", cleared.failed),
            ))
            .await;
        }

        let remote_path = remote_join(&request.publish_path, &workspace.artifact_name());
        let uploading = format!("Uploading to {}…", self.publisher.backend().provider());
        self.enter(Stage::Uploading, uploading).await;
        attempt(Stage::Uploading, self.publisher.upload(&artifact_path, &remote_path)).await?;
        self.emit(ProgressEvent::info(Stage::Uploading, format!("Uploaded to {remote_path}")))
            .await;

        self.enter(Stage::LinkResolving, "Creating share link…").await;
        let location =
            attempt(Stage::LinkResolving, self.publisher.create_or_get_shared_link(&remote_path))
                .await?;
        self.emit(ProgressEvent::info(
            Stage::LinkResolving,
            format!("Share link: {}", location.direct_url),
        ))
        .await;

        self.enter(Stage::WritingMetadata, "Updating the deployment descriptor…").await;
        attempt(
            Stage::WritingMetadata,
            descriptor::write_artifact(
                &self.descriptor_path,
                &location.direct_url,
                &artifact.digest,
            ),
        )
        .await?;
        self.emit(ProgressEvent::info(
            Stage::WritingMetadata,
            format!("{} updated", self.descriptor_path.display()),
        ))
        .await;

        Ok(StageResults {
            artifact,
            location,
            extracted_files,
        })
    }

    async fn extract(&self, artifact_path: &Path, target: &Path) -> Option<usize> {
        let archive_path = artifact_path.to_path_buf();
        let target_dir = target.to_path_buf();
        match blocking(move || archive::extract_to_dir(&archive_path, &target_dir)).await {
            Ok(files) => {
                self.emit(ProgressEvent::info(
                    Stage::Extracting,
                    format!("Extracted {files} files to {}", target.display()),
                ))
                .await;
                Some(files)
            }
            Err(e) => {
                warn!("Extraction failed: {:#}", e);
                self.emit(ProgressEvent::warning(
                    Stage::Extracting,
                    format!("Failed to extract the artifact: {e}"),
                ))
                .await;
                None
            }
        }
    }

    async fn schedule_restart(&self) -> Option<tokio::task::JoinHandle<()>> {
        let Some((host, plan)) = &self.restart else {
            self.emit(ProgressEvent::info(
                Stage::ScheduledRestart,
                "All steps complete. Restart the server to apply the new resource pack",
            ))
            .await;
            return None;
        };

        self.emit(ProgressEvent::info(
            Stage::ScheduledRestart,
            format!(
                "All steps complete. Scheduling restart in {}s…",
                plan.delay.as_secs().max(1)
            ),
        ))
        .await;
        Some(schedule_restart(Arc::clone(host), *plan))
    }

    async fn fail(&self, stage: Stage, error: anyhow::Error) -> RunFailure {
        warn!(kind = error_kind(&error), "Update failed while {}: {:#}", stage.describe(), error);
        self.emit(ProgressEvent::failure(stage, &error)).await;
        RunFailure::new(stage, error)
    }

    async fn enter(&self, stage: Stage, message: impl Into<String>) {
        debug!("Entering {}", stage);
        self.emit(ProgressEvent::info(stage, message)).await;
    }

    async fn emit(&self, event: ProgressEvent) {
        debug!("[{}] {}", event.stage, event.message);
        if self.events.send(event).await.is_err() {
            debug!("Progress receiver dropped");
        }
    }
}

fn error_kind(error: &anyhow::Error) -> &'static str {
    error.downcast_ref::<RppError>().map_or("Other", RppError::kind)
}

async fn attempt<T>(
    stage: Stage,
    operation: impl Future<Output = Result<T>>,
) -> Result<T, RunFailure> {
    operation.await.map_err(|error| RunFailure::new(stage, error))
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.context("Archive task panicked")?
}
