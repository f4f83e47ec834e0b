//! Global configuration and credential store.
//!
//! The global config lives at `~/.rpp/config.toml` (or
//! `%LOCALAPPDATA%\rpp\config.toml` on Windows) and holds the provider
//! credentials, the remote publish path and the restart hooks. Because it
//! stores secrets it is written with owner-only permissions on Unix.
//!
//! # Example
//!
//! ```toml
//! publish_path = "/survival-pack"
//! server_root = "/srv/minecraft"
//!
//! [github]
//! token = "ghp_..."
//!
//! [dropbox]
//! app_key = "..."
//! app_secret = "..."
//! refresh_token = "..."
//!
//! [restart]
//! announce = true
//! delay_seconds = 10
//! broadcast_command = "mcrcon -w 0 'say {message}'"
//! shutdown_command = "mcrcon stop"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{DEFAULT_RESTART_DELAY_SECS, DESCRIPTOR_FILE_NAME, MIN_RESTART_DELAY_SECS};

/// GitHub credential section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubCredentials {
    /// Personal access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Dropbox credential section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DropboxCredentials {
    /// App key of the Dropbox app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    /// App secret of the Dropbox app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    /// Long-lived refresh token obtained through the OAuth code flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl DropboxCredentials {
    /// All three values are present and non-blank.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.app_key, &self.app_secret, &self.refresh_token]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// Restart behaviour after a successful update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestartConfig {
    /// Broadcast a countdown notice before restarting
    #[serde(default = "default_announce")]
    pub announce: bool,

    /// Seconds between success and the shutdown signal
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,

    /// Shell command used to broadcast; `{message}` is substituted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_command: Option<String>,

    /// Shell command that stops or restarts the host service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_command: Option<String>,
}

const fn default_announce() -> bool {
    true
}

const fn default_delay_seconds() -> u64 {
    DEFAULT_RESTART_DELAY_SECS
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            announce: default_announce(),
            delay_seconds: default_delay_seconds(),
            broadcast_command: None,
            shutdown_command: None,
        }
    }
}

impl RestartConfig {
    /// Configured delay, clamped to the one-second minimum.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds.max(MIN_RESTART_DELAY_SECS))
    }
}

fn is_default_restart(config: &RestartConfig) -> bool {
    *config == RestartConfig::default()
}

/// Global RPP configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// GitHub credentials
    #[serde(default, skip_serializing_if = "is_default_github")]
    pub github: GitHubCredentials,

    /// Dropbox credentials
    #[serde(default, skip_serializing_if = "is_default_dropbox")]
    pub dropbox: DropboxCredentials,

    /// Remote folder the pack is published into, always starting with `/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_path: Option<String>,

    /// Directory holding the deployment descriptor; defaults to the cwd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_root: Option<PathBuf>,

    /// Scratch directory for run workspaces; defaults beside the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Restart hooks
    #[serde(default, skip_serializing_if = "is_default_restart")]
    pub restart: RestartConfig,
}

fn is_default_github(section: &GitHubCredentials) -> bool {
    section.token.is_none()
}

fn is_default_dropbox(section: &DropboxCredentials) -> bool {
    *section == DropboxCredentials::default()
}

impl GlobalConfig {
    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the default (empty) configuration.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit path.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Save to an explicit path with owner-only permissions.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))?;

        // Credentials live in this file
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path)
                .await
                .with_context(|| format!("Failed to read permissions for {}", path.display()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await.with_context(|| {
                format!("Failed to set secure permissions on {}", path.display())
            })?;
        }

        Ok(())
    }

    /// Default config location.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::default_dir()?.join("config.toml"))
    }

    fn default_dir() -> Result<PathBuf> {
        let dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("rpp")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".rpp")
        };
        Ok(dir)
    }

    /// Non-blank GitHub token, if configured.
    #[must_use]
    pub fn github_token(&self) -> Option<&str> {
        self.github.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Non-blank publish path, if configured.
    #[must_use]
    pub fn publish_path(&self) -> Option<&str> {
        self.publish_path.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// Store the publish path, prefixing `/` when missing.
    pub fn set_publish_path(&mut self, path: &str) -> &str {
        let trimmed = path.trim();
        let normalized =
            if trimmed.starts_with('/') { trimmed.to_string() } else { format!("/{trimmed}") };
        self.publish_path.insert(normalized)
    }

    /// Location of the deployment descriptor.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.server_root.clone().unwrap_or_else(|| PathBuf::from(".")).join(DESCRIPTOR_FILE_NAME)
    }

    /// Work directory for run workspaces, relative to the config file when unset.
    #[must_use]
    pub fn work_dir(&self, config_path: &Path) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            config_path.parent().map_or_else(|| PathBuf::from("work"), |p| p.join("work"))
        })
    }
}

/// Resolve the config file path from an explicit flag, `RPP_CONFIG`, or the default.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(env_path) = std::env::var("RPP_CONFIG")
        && !env_path.trim().is_empty()
    {
        return Ok(PathBuf::from(env_path));
    }
    GlobalConfig::default_path()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_global_config_default() {
        let config = GlobalConfig::default();
        assert!(config.github_token().is_none());
        assert!(!config.dropbox.is_complete());
        assert!(config.restart.announce);
        assert_eq!(config.restart.delay(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_global_config_save_load() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");

        let mut config = GlobalConfig::default();
        config.github.token = Some("ghp_test".to_string());
        config.dropbox = DropboxCredentials {
            app_key: Some("key".to_string()),
            app_secret: Some("secret".to_string()),
            refresh_token: Some("refresh".to_string()),
        };
        config.set_publish_path("packs");

        config.save_to(&config_path).await.unwrap();

        let loaded = GlobalConfig::load_from(&config_path).await.unwrap();
        assert_eq!(loaded.github_token(), Some("ghp_test"));
        assert!(loaded.dropbox.is_complete());
        assert_eq!(loaded.publish_path(), Some("/packs"));
    }

    #[tokio::test]
    async fn test_missing_file_yields_default() {
        let temp = TempDir::new().unwrap();
        let config =
            GlobalConfig::load_with_optional(Some(temp.path().join("absent.toml"))).await.unwrap();
        assert!(config.publish_path().is_none());
    }

    #[test]
    fn test_blank_values_are_treated_as_missing() {
        let mut config = GlobalConfig::default();
        config.github.token = Some("   ".to_string());
        config.publish_path = Some(" ".to_string());
        assert!(config.github_token().is_none());
        assert!(config.publish_path().is_none());
    }

    #[test]
    fn test_restart_delay_is_clamped() {
        let restart = RestartConfig {
            delay_seconds: 0,
            ..RestartConfig::default()
        };
        assert_eq!(restart.delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_descriptor_path_uses_server_root() {
        let config = GlobalConfig {
            server_root: Some(PathBuf::from("/srv/mc")),
            ..GlobalConfig::default()
        };
        assert_eq!(config.descriptor_path(), PathBuf::from("/srv/mc/server.properties"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("test-config.toml");

        GlobalConfig::default().save_to(&config_path).await.unwrap();

        let mode = tokio::fs::metadata(&config_path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "Config file should have 600 permissions");
    }
}
