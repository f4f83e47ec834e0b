//! In-memory collaborators with call counters.
//!
//! - [`FakeSource`] serves a fixed archive for any repository
//! - [`FakeStorage`] keeps remote folders, uploads and share links in memory
//! - [`RecordingHost`] records broadcasts and shutdowns
//!
//! Every network-shaped call is counted so tests can assert that nothing
//! was attempted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use crate::core::RppError;
use crate::pipeline::HostControl;
use crate::publish::{FolderPage, RemoteEntry, StorageBackend};
use crate::source::{DownloadLocator, RepoSlug, SourceIdentity, SourceRepository};

/// Counters for [`FakeSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCalls {
    pub validate: usize,
    pub download: usize,
}

/// A source repository that serves `archive` for every download.
pub struct FakeSource {
    archive: Vec<u8>,
    has_credential: bool,
    download_error: Option<fn(&str) -> RppError>,
    validate_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl FakeSource {
    pub fn serving(archive: Vec<u8>) -> Self {
        Self {
            archive,
            has_credential: true,
            download_error: None,
            validate_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }

    /// Fail every download with the error built from the locator URL.
    pub fn failing_download(mut self, error: fn(&str) -> RppError) -> Self {
        self.download_error = Some(error);
        self
    }

    pub fn calls(&self) -> SourceCalls {
        SourceCalls {
            validate: self.validate_calls.load(Ordering::SeqCst),
            download: self.download_calls.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl SourceRepository for FakeSource {
    fn provider(&self) -> &str {
        "GitHub"
    }

    fn has_credential(&self) -> bool {
        self.has_credential
    }

    async fn validate_credential(&self) -> Result<SourceIdentity> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SourceIdentity {
            login: "fake-user".to_string(),
        })
    }

    fn resolve_download_locator(&self, repository: &str, branch: &str) -> Result<DownloadLocator> {
        let slug = RepoSlug::parse(repository)?;
        Ok(DownloadLocator {
            url: format!("fake://{}/{}/{}", slug.owner, slug.name, branch),
            slug,
            branch: branch.to_string(),
        })
    }

    async fn download(&self, locator: &DownloadLocator, destination: &Path) -> Result<u64> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.download_error {
            return Err(error(&locator.url).into());
        }
        tokio::fs::write(destination, &self.archive).await?;
        Ok(self.archive.len() as u64)
    }
}

/// Counters for [`FakeStorage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageCalls {
    pub account: usize,
    pub lists: usize,
    pub deletes: usize,
    pub uploads: usize,
    pub link_creates: usize,
    pub link_lists: usize,
}

impl StorageCalls {
    pub fn total(&self) -> usize {
        self.account
            + self.lists
            + self.deletes
            + self.uploads
            + self.link_creates
            + self.link_lists
    }
}

#[derive(Default)]
struct StorageState {
    folders: BTreeMap<String, Vec<String>>,
    files: HashMap<String, Vec<u8>>,
    links: HashMap<String, String>,
    cursors: HashMap<String, Vec<String>>,
    forced_conflicts: HashSet<String>,
    failing_deletes: HashSet<String>,
    calls: StorageCalls,
}

type LinkHook = Box<dyn Fn(&str) + Send + Sync>;

/// An in-memory storage backend.
pub struct FakeStorage {
    state: Mutex<StorageState>,
    has_credential: bool,
    page_size: usize,
    fail_uploads: bool,
    on_link: Option<LinkHook>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StorageState::default()),
            has_credential: true,
            page_size: 100,
            fail_uploads: false,
            on_link: None,
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// Run `hook` with the remote path after every successful link creation.
    pub fn on_link(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_link = Some(Box::new(hook));
        self
    }

    /// Create `folder` holding files named `names`.
    pub fn seed_folder(&self, folder: &str, names: &[&str]) {
        let state = &mut *self.state.lock().unwrap();
        let entries = state.folders.entry(folder.to_string()).or_default();
        for name in names {
            let path = format!("{folder}/{name}");
            entries.push(path.clone());
            state.files.insert(path, Vec::new());
        }
    }

    pub fn fail_delete_of(&self, path: &str) {
        self.state.lock().unwrap().failing_deletes.insert(path.to_string());
    }

    pub fn set_existing_link(&self, path: &str, url: &str) {
        self.state.lock().unwrap().links.insert(path.to_string(), url.to_string());
    }

    /// Report a link conflict for `path` even though no link exists.
    pub fn force_link_conflict(&self, path: &str) {
        self.state.lock().unwrap().forced_conflicts.insert(path.to_string());
    }

    pub fn folder_entries(&self, folder: &str) -> Vec<String> {
        self.state.lock().unwrap().folders.get(folder).cloned().unwrap_or_default()
    }

    pub fn uploaded(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn calls(&self) -> StorageCalls {
        self.state.lock().unwrap().calls
    }

    fn page(&self, state: &mut StorageState, mut remaining: Vec<String>) -> FolderPage {
        let rest = if remaining.len() > self.page_size {
            remaining.split_off(self.page_size)
        } else {
            Vec::new()
        };
        let has_more = !rest.is_empty();
        let cursor = if has_more {
            let cursor = format!("cursor-{}", state.cursors.len());
            state.cursors.insert(cursor.clone(), rest);
            cursor
        } else {
            String::new()
        };
        FolderPage {
            entries: remaining.into_iter().map(|path| RemoteEntry { path }).collect(),
            cursor,
            has_more,
        }
    }
}

fn parent_folder(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

#[async_trait]
impl StorageBackend for FakeStorage {
    fn provider(&self) -> &str {
        "Dropbox"
    }

    fn has_credential(&self) -> bool {
        self.has_credential
    }

    async fn account_name(&self) -> Result<String> {
        self.state.lock().unwrap().calls.account += 1;
        Ok("Fake Account".to_string())
    }

    async fn list_folder(&self, path: &str) -> Result<FolderPage> {
        let mut state = self.state.lock().unwrap();
        state.calls.lists += 1;
        let Some(entries) = state.folders.get(path).cloned() else {
            return Err(RppError::RemoteNotFound {
                path: path.to_string(),
            }
            .into());
        };
        Ok(self.page(&mut state, entries))
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<FolderPage> {
        let mut state = self.state.lock().unwrap();
        state.calls.lists += 1;
        let remaining = state.cursors.remove(cursor).unwrap_or_default();
        Ok(self.page(&mut state, remaining))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.deletes += 1;
        if state.failing_deletes.contains(path) {
            return Err(RppError::TransferFailure {
                operation: "delete".to_string(),
                status: Some(409),
                reason: "locked".to_string(),
            }
            .into());
        }
        if let Some(entries) = state.folders.get_mut(&parent_folder(path)) {
            entries.retain(|p| p != path);
        }
        state.files.remove(path);
        state.links.remove(path);
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let contents = tokio::fs::read(local).await?;
        let mut state = self.state.lock().unwrap();
        state.calls.uploads += 1;
        if self.fail_uploads {
            return Err(RppError::TransferFailure {
                operation: "upload".to_string(),
                status: Some(503),
                reason: "service unavailable".to_string(),
            }
            .into());
        }
        let entries = state.folders.entry(parent_folder(remote)).or_default();
        if !entries.iter().any(|p| p == remote) {
            entries.push(remote.to_string());
        }
        state.files.insert(remote.to_string(), contents);
        Ok(())
    }

    async fn create_shared_link(&self, remote: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.link_creates += 1;
        if state.forced_conflicts.contains(remote) || state.links.contains_key(remote) {
            return Err(RppError::PublishConflict {
                path: remote.to_string(),
            }
            .into());
        }
        if !state.files.contains_key(remote) {
            return Err(RppError::RemoteNotFound {
                path: remote.to_string(),
            }
            .into());
        }
        let url = format!("https://share.example{remote}?rlkey=fake&dl=0");
        state.links.insert(remote.to_string(), url.clone());
        drop(state);
        if let Some(hook) = &self.on_link {
            hook(remote);
        }
        Ok(url)
    }

    async fn list_direct_links(&self, remote: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.link_lists += 1;
        Ok(state.links.get(remote).cloned().into_iter().collect())
    }
}

/// One effect recorded by [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Broadcast(String),
    Shutdown,
}

/// A host that records every call, optionally failing each one.
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    fail: bool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: HostCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            anyhow::bail!("host unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl HostControl for RecordingHost {
    async fn broadcast(&self, message: &str) -> Result<()> {
        self.record(HostCall::Broadcast(message.to_string()))
    }

    async fn shutdown(&self) -> Result<()> {
        self.record(HostCall::Shutdown)
    }
}
