//! File system helpers.
//!
//! - [`atomic_write`] writes through a sibling temp file and renames it into
//!   place, so readers never observe a half-written file
//! - [`remove_dir_best_effort`] deletes a directory tree and reports a
//!   [`RppError::CleanupWarning`] instead of failing

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::RppError;

/// Write `content` to `path` atomically.
///
/// The data goes to `<name>.tmp` next to the target, is synced, then renamed
/// over the target. On failure the temp file is removed and the target is
/// left as it was.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let temp_path = temp_sibling(path);
    let result = write_and_rename(&temp_path, path, content);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_and_rename(temp_path: &Path, path: &Path, content: &[u8]) -> Result<()> {
    {
        let mut file = fs::File::create(temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;
        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
    Ok(())
}

/// Remove `dir` and everything below it.
///
/// A directory that is already gone counts as removed.
pub async fn remove_dir_best_effort(dir: &Path) -> Result<(), RppError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!("Removed {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RppError::CleanupWarning {
            path: dir.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("server.properties");
        fs::write(&path, "old").unwrap();

        atomic_write(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!temp.path().join("server.properties.tmp").exists());
    }

    #[test]
    fn test_atomic_write_creates_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/file.txt");
        atomic_write(&path, b"x").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_remove_dir_best_effort() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("workspace");
        fs::create_dir_all(dir.join("extracted/assets")).unwrap();
        fs::write(dir.join("download.zip"), b"zip").unwrap();

        remove_dir_best_effort(&dir).await.unwrap();
        assert!(!dir.exists());

        // Already gone
        remove_dir_best_effort(&dir).await.unwrap();
    }
}
