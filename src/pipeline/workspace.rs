//! Per-run scratch directories.
//!
//! Layout of one workspace:
//!
//! ```text
//! <work_dir>/resourcepack-<dd-MM-yyyy-HH-mm-ss>-<run id>/
//! ├── download.zip                      raw snapshot from the source
//! ├── Resourcepack-<timestamp>.zip      repackaged artifact
//! └── extracted/                        browsable copy of the artifact
//! ```
//!
//! The run id keeps two runs started in the same second apart.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::core::RppError;
use crate::utils::fs::remove_dir_best_effort;

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y-%H-%M-%S";

/// A disposable directory owned by a single run.
#[derive(Debug)]
pub struct RunWorkspace {
    root: PathBuf,
    timestamp: String,
}

impl RunWorkspace {
    /// Create a fresh workspace under `work_dir`.
    pub async fn create(work_dir: &Path, now: DateTime<Local>) -> Result<Self> {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let root = work_dir.join(format!("resourcepack-{timestamp}-{}", &run_id[..8]));

        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create workspace {}", root.display()))?;

        Ok(Self { root, timestamp })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Where the raw download is written.
    pub fn download_path(&self) -> PathBuf {
        self.root.join("download.zip")
    }

    /// File name of the artifact, also used on the remote side.
    pub fn artifact_name(&self) -> String {
        format!("Resourcepack-{}.zip", self.timestamp)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.root.join(self.artifact_name())
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.root.join("extracted")
    }

    /// Delete the workspace and everything in it.
    pub async fn remove(self) -> Result<(), RppError> {
        remove_dir_best_effort(&self.root).await
    }
}
