//! Strip the top-level folder from a source zipball.
//!
//! Code hosts wrap repository snapshots in a folder such as
//! `owner-repo-abc123/`, but the consuming service expects the marker file at
//! the archive root. Repackaging runs in two passes over the input:
//!
//! 1. Scan entries in container order for the first *file* whose basename is
//!    the marker. Its parent path (with trailing `/`, or empty at the root)
//!    becomes the root prefix.
//! 2. Re-open the input and copy every entry under the prefix into a new
//!    archive with the prefix removed. Entries outside the prefix and the
//!    prefix directory itself are dropped.
//!
//! Entries are copied raw: compressed bytes, compression method, timestamps
//! and the directory/file kind are carried over unchanged, and nothing is
//! decompressed into memory. Output order follows input order, so the same
//! input always produces the same entry list.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use zip::{ZipArchive, ZipWriter};

use crate::core::RppError;

/// What a repackaging run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackageSummary {
    /// Prefix stripped from every carried entry, with trailing `/` unless empty
    pub root_prefix: String,
    /// Entries written to the output
    pub entries_written: usize,
    /// Entries dropped because they sat outside the prefix or were the prefix itself
    pub entries_skipped: usize,
}

/// Locate the root prefix: the parent path of the first marker file.
///
/// Returns [`RppError::NoRootMarkerFound`] when no file entry has the marker
/// as its exact basename.
pub fn find_root_prefix(input: &Path, marker: &str) -> Result<String> {
    let mut archive = open_archive(input)?;

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| archive_error(input, &e))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name();
        let (parent, basename) = match name.rfind('/') {
            Some(slash) => (&name[..=slash], &name[slash + 1..]),
            None => ("", name),
        };
        if basename == marker {
            debug!("Found {} at '{}'", marker, name);
            return Ok(parent.to_string());
        }
    }

    Err(RppError::NoRootMarkerFound {
        marker: marker.to_string(),
    }
    .into())
}

/// Rewrite `input` into `output` with the marker's parent folder stripped.
///
/// No output file is created when the marker is missing. If the copy fails
/// halfway, the partial output is removed before the error is returned.
pub fn repackage(input: &Path, output: &Path, marker: &str) -> Result<RepackageSummary> {
    let root_prefix = find_root_prefix(input, marker)?;

    let result = write_stripped(input, output, &root_prefix);
    if result.is_err()
        && output.exists()
        && let Err(e) = std::fs::remove_file(output)
    {
        warn!("Failed to remove partial archive {}: {}", output.display(), e);
    }
    result
}

fn write_stripped(input: &Path, output: &Path, root_prefix: &str) -> Result<RepackageSummary> {
    let mut archive = open_archive(input)?;
    let out_file = File::create(output)
        .with_context(|| format!("Failed to create archive {}", output.display()))?;
    let mut writer = ZipWriter::new(BufWriter::new(out_file));

    let mut summary = RepackageSummary {
        root_prefix: root_prefix.to_string(),
        entries_written: 0,
        entries_skipped: 0,
    };

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| archive_error(input, &e))?;
        let Some(new_name) = entry.name().strip_prefix(root_prefix).map(str::to_string) else {
            summary.entries_skipped += 1;
            continue;
        };
        if new_name.is_empty() {
            summary.entries_skipped += 1;
            continue;
        }

        writer
            .raw_copy_file_rename(entry, new_name.as_str())
            .with_context(|| format!("Failed to copy entry '{new_name}'"))?;
        summary.entries_written += 1;
    }

    let mut inner = writer
        .finish()
        .with_context(|| format!("Failed to finalize archive {}", output.display()))?;
    inner.flush()?;

    debug!(
        "Repackaged {} -> {} (prefix '{}', {} written, {} skipped)",
        input.display(),
        output.display(),
        summary.root_prefix,
        summary.entries_written,
        summary.entries_skipped
    );
    Ok(summary)
}

pub(super) fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open archive {}", path.display()))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| archive_error(path, &e))
}

pub(super) fn archive_error(path: &Path, error: &zip::result::ZipError) -> anyhow::Error {
    RppError::ArchiveFormatError {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
    .into()
}
