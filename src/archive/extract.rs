//! Unpack a repackaged artifact into a browsable directory.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::repackage::{archive_error, open_archive};
use crate::core::RppError;

/// Extract every entry of `archive_path` below `target_dir`.
///
/// Entry names that would escape `target_dir` (absolute paths, `..`
/// components) are rejected with [`RppError::ArchiveFormatError`].
/// Returns the number of files written.
pub fn extract_to_dir(archive_path: &Path, target_dir: &Path) -> Result<usize> {
    let mut archive = open_archive(archive_path)?;
    fs::create_dir_all(target_dir)
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;

    let mut files = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| archive_error(archive_path, &e))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(RppError::ArchiveFormatError {
                path: archive_path.display().to_string(),
                reason: format!("entry '{}' escapes the extraction directory", entry.name()),
            }
            .into());
        };
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", out_path.display()))?;
        files += 1;
    }

    debug!("Extracted {} files into {}", files, target_dir.display());
    Ok(files)
}
