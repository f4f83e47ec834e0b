//! Single-flight guard for update runs.
//!
//! Every `rpp update` is its own process, so exclusivity is enforced with an
//! advisory file lock on `<work_dir>/.update.lock` rather than an in-memory
//! flag. The lock is taken without waiting: a second run fails fast with
//! [`RppError::RunInProgress`]. The OS drops the lock if the process dies.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use crate::constants::UPDATE_LOCK_FILE;
use crate::core::RppError;

/// Held for the whole duration of a run; releases the lock on drop.
#[derive(Debug)]
pub struct RunGuard {
    file: File,
    path: PathBuf,
}

impl RunGuard {
    /// Take the run lock in `work_dir`, failing if another run holds it.
    pub async fn try_acquire(work_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(work_dir)
            .await
            .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;

        let path = work_dir.join(UPDATE_LOCK_FILE);
        let lock_path = path.clone();

        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

            let acquired = FileExt::try_lock_exclusive(&file)
                .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
            if !acquired {
                return Err(RppError::RunInProgress {
                    lock_path: lock_path.display().to_string(),
                }
                .into());
            }
            Ok(file)
        })
        .await
        .context("Failed to spawn blocking task for lock acquisition")??;

        debug!("Acquired run lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_second_acquire_is_rejected() {
        let temp = TempDir::new().unwrap();

        let guard = RunGuard::try_acquire(temp.path()).await.unwrap();
        let err = RunGuard::try_acquire(temp.path()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RppError>(), Some(RppError::RunInProgress { .. })));

        drop(guard);
        RunGuard::try_acquire(temp.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_creates_work_dir() {
        let temp = TempDir::new().unwrap();
        let work_dir = temp.path().join("work");
        let guard = RunGuard::try_acquire(&work_dir).await.unwrap();
        assert!(guard.path().exists());
    }
}
