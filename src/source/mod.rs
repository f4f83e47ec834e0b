//! Source repository collaborators.
//!
//! A [`SourceRepository`] turns a human-provided repository locator and a
//! branch into an authenticated byte stream of the repository snapshot. The
//! update pipeline only sees this trait; [`github::GitHubSource`] is the
//! production implementation.
//!
//! # Accepted locators
//!
//! - `https://github.com/owner/repo` (optionally with `.git` or a trailing `/`)
//! - `git@github.com:owner/repo.git`
//! - `owner/repo`

pub mod github;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use crate::core::RppError;

pub use github::GitHubSource;

static HOSTED_LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[:/]+([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$")
        .expect("valid regex")
});

static BARE_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?$").expect("valid regex")
});

/// Owner/name pair identifying a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse an HTTPS browse URL, an SSH locator or a bare `owner/repo`.
    ///
    /// Anything else is [`RppError::ParseFailure`].
    pub fn parse(input: &str) -> Result<Self, RppError> {
        let trimmed = input.trim();
        let pattern = if trimmed.contains("github.com") { &*HOSTED_LOCATOR } else { &*BARE_SLUG };
        let captures = pattern.captures(trimmed);

        let parsed = captures.and_then(|c| {
            let owner = c.get(1)?.as_str();
            let name = c.get(2)?.as_str();
            (!is_dot_segment(owner) && !is_dot_segment(name)).then(|| Self {
                owner: owner.to_string(),
                name: name.to_string(),
            })
        });

        parsed.ok_or_else(|| RppError::ParseFailure {
            input: input.to_string(),
        })
    }
}

fn is_dot_segment(segment: &str) -> bool {
    segment.chars().all(|c| c == '.')
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Where the snapshot for a repository/branch pair can be downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLocator {
    /// Repository the locator was resolved for
    pub slug: RepoSlug,
    /// Branch or ref name
    pub branch: String,
    /// Archive URL
    pub url: String,
}

/// Account behind a validated source credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub login: String,
}

/// A remote code host that serves repository snapshots as zip archives.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Display name of the provider, used in messages.
    fn provider(&self) -> &str;

    /// Whether a credential is configured. Must not touch the network.
    fn has_credential(&self) -> bool;

    /// Check the credential against the provider and return the account.
    async fn validate_credential(&self) -> Result<SourceIdentity>;

    /// Turn a repository locator and branch into a download locator.
    fn resolve_download_locator(&self, repository: &str, branch: &str) -> Result<DownloadLocator>;

    /// Stream the snapshot at `locator` into `destination`, returning bytes written.
    async fn download(&self, locator: &DownloadLocator, destination: &Path) -> Result<u64>;
}
