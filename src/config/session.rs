//! Short-lived pending sessions for the Dropbox linking flow.
//!
//! Linking Dropbox is a two-step exchange: `rpp dropbox <key> <secret>` prints
//! an authorize URL, and `rpp dropbox-code <code>` finishes the job. Between
//! the two invocations the app key and secret are parked here, keyed by the
//! requesting actor, with an expiry. The store is a small TOML file next to
//! the global config and shares its owner-only permissions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::core::RppError;

/// One pending link request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingLink {
    /// Dropbox app key
    pub app_key: String,
    /// Dropbox app secret
    pub app_secret: String,
    /// When the request was started
    pub created_at: DateTime<Utc>,
    /// After this instant the request can no longer be completed
    pub expires_at: DateTime<Utc>,
}

impl PendingLink {
    /// Create a record valid for `ttl` from `now`.
    #[must_use]
    pub fn new(app_key: String, app_secret: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(10));
        Self {
            app_key,
            app_secret,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the record is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingFile {
    #[serde(default)]
    sessions: BTreeMap<String, PendingLink>,
}

/// File-backed store of [`PendingLink`]s keyed by actor.
pub struct PendingLinkStore {
    path: PathBuf,
}

impl PendingLinkStore {
    /// Store located at `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
        }
    }

    /// Store placed next to the given config file.
    #[must_use]
    pub fn beside(config_path: &Path) -> Self {
        let dir = config_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::new(dir.join("pending.toml"))
    }

    /// Record (or replace) the pending link for `actor`, dropping expired entries.
    pub async fn put(&self, actor: &str, link: PendingLink) -> Result<()> {
        let mut file = self.read().await?;
        let now = Utc::now();
        file.sessions.retain(|_, l| !l.is_expired(now));
        file.sessions.insert(actor.to_string(), link);
        self.write(&file).await
    }

    /// Remove and return the pending link for `actor`.
    ///
    /// The entry is removed even when expired, so a stale request can never
    /// be completed later.
    pub async fn take(&self, actor: &str, now: DateTime<Utc>) -> Result<PendingLink> {
        let mut file = self.read().await?;
        let link = file.sessions.remove(actor);
        self.write(&file).await?;

        match link {
            None => Err(RppError::NoPendingSession {
                actor: actor.to_string(),
            }
            .into()),
            Some(link) if link.is_expired(now) => Err(RppError::SessionExpired {
                actor: actor.to_string(),
            }
            .into()),
            Some(link) => Ok(link),
        }
    }

    async fn read(&self) -> Result<PendingFile> {
        if !self.path.exists() {
            return Ok(PendingFile::default());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    async fn write(&self, file: &PendingFile) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(file).context("Failed to serialize pending sessions")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }
}

/// Identity of the person running the command, used to key pending sessions.
#[must_use]
pub fn current_actor() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "console".to_string())
}
