//! The host service's deployment descriptor (`server.properties`).
//!
//! Only two keys belong to this tool: `resource-pack` (public artifact URL)
//! and `resource-pack-sha1` (artifact digest). They are always written
//! together, every other line is left exactly as it was, and the file is
//! replaced atomically.
//!
//! The file is read as UTF-8, falling back to ISO-8859-1 for files written
//! by tools that use the legacy `.properties` encoding, and always written
//! as UTF-8.

pub mod properties;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::constants::{DESCRIPTOR_DIGEST_KEY, DESCRIPTOR_URL_KEY};
use crate::core::RppError;
use crate::utils::fs::atomic_write;

pub use properties::PropertiesDocument;

/// A loaded deployment descriptor.
#[derive(Debug, Clone)]
pub struct DeploymentDescriptor {
    path: PathBuf,
    document: PropertiesDocument,
}

impl DeploymentDescriptor {
    /// Load the descriptor at `path`.
    ///
    /// A missing file is [`RppError::DescriptorNotFound`]; any other read
    /// failure is [`RppError::MetadataWriteFailure`].
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RppError::DescriptorNotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            Err(e) => {
                return Err(RppError::MetadataWriteFailure {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
                .into());
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            document: PropertiesDocument::parse(&decode(bytes)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.document.get(key)
    }

    /// Current artifact URL, if set and non-empty.
    pub fn artifact_url(&self) -> Option<&str> {
        self.get(DESCRIPTOR_URL_KEY).filter(|v| !v.is_empty())
    }

    /// Current artifact digest, if set and non-empty.
    pub fn artifact_digest(&self) -> Option<&str> {
        self.get(DESCRIPTOR_DIGEST_KEY).filter(|v| !v.is_empty())
    }

    /// Point the descriptor at a new artifact.
    pub fn set_artifact(&mut self, url: &str, digest: &str) {
        self.document.set(DESCRIPTOR_URL_KEY, url);
        self.document.set(DESCRIPTOR_DIGEST_KEY, digest);
    }

    /// Write the descriptor back as UTF-8, replacing the file atomically.
    pub async fn save(&self) -> Result<()> {
        let path = self.path.clone();
        let content = self.document.render().into_bytes();
        let written = tokio::task::spawn_blocking(move || atomic_write(&path, &content)).await;

        let failure = match written {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => format!("{e:#}"),
            Err(join) => join.to_string(),
        };
        Err(RppError::MetadataWriteFailure {
            path: self.path.display().to_string(),
            reason: failure,
        }
        .into())
    }
}

/// Load, set both owned keys and save in one step.
pub async fn write_artifact(path: &Path, url: &str, digest: &str) -> Result<()> {
    let mut descriptor = DeploymentDescriptor::load(path).await?;
    descriptor.set_artifact(url, digest);
    descriptor.save().await?;
    info!("Updated {} with the new artifact", path.display());
    Ok(())
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}
