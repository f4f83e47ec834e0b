//! Values that flow through an update run.

use std::fmt;

use tokio::task::JoinHandle;

use crate::checksum::ArtifactDescriptor;
use crate::core::RppError;
use crate::publish::PublishedLocation;

/// Immutable input of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Repository locator as typed by the user
    pub repository: String,
    /// Branch or ref to build from
    pub branch: String,
    /// Who asked for the run; progress is addressed to them
    pub requested_by: String,
    /// Remote folder the artifact is published into
    pub publish_path: String,
}

/// States of the update state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Validating,
    FetchingSource,
    Repackaging,
    Extracting,
    Hashing,
    Clearing,
    Uploading,
    LinkResolving,
    WritingMetadata,
    CleaningUp,
    ScheduledRestart,
}

impl Stage {
    /// Progressive phrase for messages ("while downloading the source").
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "checking preconditions",
            Self::FetchingSource => "downloading the source archive",
            Self::Repackaging => "repackaging the archive",
            Self::Extracting => "extracting the artifact",
            Self::Hashing => "computing the artifact digest",
            Self::Clearing => "clearing the publish folder",
            Self::Uploading => "uploading the artifact",
            Self::LinkResolving => "resolving the share link",
            Self::WritingMetadata => "updating the deployment descriptor",
            Self::CleaningUp => "cleaning up the workspace",
            Self::ScheduledRestart => "scheduling the restart",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a progress event should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One progress report from a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    pub severity: Severity,
    /// Error category when the event reports a failure, see [`RppError::kind`]
    pub kind: Option<&'static str>,
}

impl ProgressEvent {
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            severity: Severity::Info,
            kind: None,
        }
    }

    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            severity: Severity::Warning,
            kind: None,
        }
    }

    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            severity: Severity::Error,
            kind: None,
        }
    }

    /// Error event for a run that stopped at `stage`, tagged with the error's category.
    pub fn failure(stage: Stage, error: &anyhow::Error) -> Self {
        Self {
            kind: error.downcast_ref::<RppError>().map(RppError::kind),
            ..Self::error(stage, error.to_string())
        }
    }
}

/// A run that stopped at `stage`.
#[derive(Debug)]
pub struct RunFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

impl RunFailure {
    pub fn new(stage: Stage, error: anyhow::Error) -> Self {
        Self { stage, error }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Update failed while {}: {}", self.stage.describe(), self.error)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    pub artifact: ArtifactDescriptor,
    pub location: PublishedLocation,
    /// Files written by the auxiliary extraction, `None` when it failed
    pub extracted_files: Option<usize>,
    /// Pending restart, when one was scheduled
    pub restart: Option<JoinHandle<()>>,
}
