//! Publishing artifacts to remote storage.
//!
//! The work is split in two layers:
//!
//! - [`StorageBackend`] - primitive remote operations (list, delete, upload,
//!   share links), implemented over HTTP by [`dropbox::DropboxBackend`]
//! - [`Publisher`] - the policy on top: full-replace folder clearing and
//!   share link creation with the "already exists" fallback
//!
//! Remote paths are strings rooted at `/`.

pub mod dropbox;
pub mod link;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::RppError;

pub use dropbox::DropboxBackend;
pub use link::{PublishedLocation, direct_download_url};

/// One entry returned by a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Full remote path of the entry
    pub path: String,
}

/// A page of folder entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderPage {
    pub entries: Vec<RemoteEntry>,
    /// Continuation cursor; meaningful only when `has_more` is set
    pub cursor: String,
    pub has_more: bool,
}

/// Primitive operations of a remote file-sharing service.
///
/// Implementations report a missing path as [`RppError::RemoteNotFound`] and
/// an existing share link as [`RppError::PublishConflict`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Display name of the provider, used in messages.
    fn provider(&self) -> &str;

    /// Whether credentials are configured. Must not touch the network.
    fn has_credential(&self) -> bool;

    /// Display name of the linked account.
    async fn account_name(&self) -> Result<String>;

    async fn list_folder(&self, path: &str) -> Result<FolderPage>;

    async fn list_folder_continue(&self, cursor: &str) -> Result<FolderPage>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Upload `local` to `remote`, replacing whatever is there.
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Create a public link for `remote` and return its URL.
    async fn create_shared_link(&self, remote: &str) -> Result<String>;

    /// Existing direct links for `remote`.
    async fn list_direct_links(&self, remote: &str) -> Result<Vec<String>>;
}

/// Outcome of [`Publisher::clear_folder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Publishing policy over a [`StorageBackend`].
#[derive(Clone)]
pub struct Publisher {
    backend: Arc<dyn StorageBackend>,
}

impl Publisher {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Delete every entry under `path`.
    ///
    /// A folder that does not exist yet is treated as already clear. Failed
    /// deletes are logged and counted but do not stop the sweep.
    pub async fn clear_folder(&self, path: &str) -> Result<ClearSummary> {
        let folder = normalize_remote_path(path);
        let mut summary = ClearSummary::default();

        let mut page = match self.backend.list_folder(&folder).await {
            Ok(page) => page,
            Err(e) if is_remote_not_found(&e) => {
                info!("{} folder {} does not exist yet", self.backend.provider(), folder);
                return Ok(summary);
            }
            Err(e) => return Err(e),
        };

        loop {
            for entry in &page.entries {
                match self.backend.delete(&entry.path).await {
                    Ok(()) => {
                        debug!("Deleted {}", entry.path);
                        summary.deleted += 1;
                    }
                    Err(e) => {
                        warn!("Failed to delete {}: {:#}", entry.path, e);
                        summary.failed += 1;
                    }
                }
            }
            if !page.has_more {
                break;
            }
            page = self.backend.list_folder_continue(&page.cursor).await?;
        }

        info!(
            "Cleared {} ({} deleted, {} failed)",
            folder, summary.deleted, summary.failed
        );
        Ok(summary)
    }

    /// Overwrite-mode upload of `local` to `remote`.
    pub async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let remote = normalize_remote_path(remote);
        self.backend.upload(local, &remote).await?;
        info!("Uploaded {} to {}", local.display(), remote);
        Ok(())
    }

    /// Create a public link for `remote`, reusing an existing one on conflict.
    ///
    /// When the backend reports that a link already exists, the first
    /// existing direct link is returned instead. If there is none, the
    /// original conflict error is returned.
    pub async fn create_or_get_shared_link(&self, remote: &str) -> Result<PublishedLocation> {
        let remote = normalize_remote_path(remote);
        let share_url = match self.backend.create_shared_link(&remote).await {
            Ok(url) => url,
            Err(create_error) if is_publish_conflict(&create_error) => {
                debug!("Share link for {} already exists, listing existing links", remote);
                let existing = self.backend.list_direct_links(&remote).await?;
                match existing.into_iter().next() {
                    Some(url) => url,
                    None => return Err(create_error),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(PublishedLocation::new(remote, share_url))
    }
}

/// Prefix `/` when missing and drop a trailing `/`.
pub fn normalize_remote_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') { trimmed.to_string() } else { format!("/{trimmed}") }
}

/// Join a folder and a file name into a remote path.
pub fn remote_join(folder: &str, name: &str) -> String {
    let folder = normalize_remote_path(folder);
    if folder == "/" { format!("/{name}") } else { format!("{folder}/{name}") }
}

fn is_remote_not_found(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<RppError>(), Some(RppError::RemoteNotFound { .. }))
}

fn is_publish_conflict(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<RppError>(), Some(RppError::PublishConflict { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fakes::FakeStorage;

    #[tokio::test]
    async fn test_clear_missing_folder_is_noop() {
        let storage = Arc::new(FakeStorage::new());
        let publisher = Publisher::new(storage.clone());

        let summary = publisher.clear_folder("/does-not-exist").await.unwrap();
        assert_eq!(summary, ClearSummary::default());
        assert_eq!(storage.calls().deletes, 0);
    }

    #[tokio::test]
    async fn test_clear_deletes_every_page() {
        let storage = Arc::new(FakeStorage::new().with_page_size(2));
        storage.seed_folder("/packs", &["a.zip", "b.zip", "c.zip"]);
        let publisher = Publisher::new(storage.clone());

        let summary = publisher.clear_folder("packs").await.unwrap();
        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.failed, 0);
        assert!(storage.folder_entries("/packs").is_empty());
    }

    #[tokio::test]
    async fn test_clear_continues_past_failed_deletes() {
        let storage = Arc::new(FakeStorage::new());
        storage.seed_folder("/packs", &["a.zip", "locked.zip", "c.zip"]);
        storage.fail_delete_of("/packs/locked.zip");
        let publisher = Publisher::new(storage.clone());

        let summary = publisher.clear_folder("/packs").await.unwrap();
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(storage.folder_entries("/packs"), vec!["/packs/locked.zip".to_string()]);
    }

    #[tokio::test]
    async fn test_shared_link_fallback_on_conflict() {
        let storage = Arc::new(FakeStorage::new());
        storage.set_existing_link("/packs/p.zip", "https://share.example/p.zip?dl=0");
        let publisher = Publisher::new(storage.clone());

        let location = publisher.create_or_get_shared_link("/packs/p.zip").await.unwrap();
        assert_eq!(location.share_url, "https://share.example/p.zip?dl=0");
        assert_eq!(location.direct_url, "https://share.example/p.zip?dl=1");
    }

    #[tokio::test]
    async fn test_conflict_without_existing_link_propagates() {
        let storage = Arc::new(FakeStorage::new());
        storage.force_link_conflict("/packs/p.zip");
        let publisher = Publisher::new(storage.clone());

        let err = publisher.create_or_get_shared_link("/packs/p.zip").await.unwrap_err();
        assert!(is_publish_conflict(&err));
    }

    #[test]
    fn test_remote_paths() {
        assert_eq!(normalize_remote_path("packs/"), "/packs");
        assert_eq!(normalize_remote_path("/packs"), "/packs");
        assert_eq!(remote_join("/packs", "p.zip"), "/packs/p.zip");
        assert_eq!(remote_join("/", "p.zip"), "/p.zip");
    }
}
