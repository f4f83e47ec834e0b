//! SHA-1 digest of the published artifact.
//!
//! The consuming service pins the pack by its SHA-1 (`resource-pack-sha1`),
//! so the algorithm here is a compatibility format and must only change
//! together with the consumer. Files are streamed in fixed-size chunks.

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::constants::DIGEST_CHUNK_SIZE;

/// Length of a hex-encoded SHA-1 digest.
pub const SHA1_HEX_LEN: usize = 40;

/// A built artifact ready for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    /// Local path of the artifact
    pub path: PathBuf,
    /// Size in bytes
    pub len: u64,
    /// Lowercase hex SHA-1 of the file contents
    pub digest: String,
}

/// Stream `path` through SHA-1 and return the lowercase hex digest.
pub async fn sha1_hex(path: &Path) -> Result<String> {
    Ok(describe(path).await?.digest)
}

/// Digest `path` and record its size.
pub async fn describe(path: &Path) -> Result<ArtifactDescriptor> {
    let mut file =
        File::open(path).await.with_context(|| format!("Failed to open {}", path.display()))?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];
    let mut len = 0u64;
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        len += read as u64;
    }

    let digest = hex::encode(hasher.finalize());
    debug!("SHA-1 of {} ({} bytes): {}", path.display(), len, digest);

    Ok(ArtifactDescriptor {
        path: path.to_path_buf(),
        len,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_known_digest() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Hello, World!").unwrap();

        let digest = sha1_hex(temp_file.path()).await.unwrap();
        assert_eq!(digest, "0a0a9f2a6772942557ab5355d76af442f8f65e01");
    }

    #[tokio::test]
    async fn test_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let artifact = describe(temp_file.path()).await.unwrap();
        assert_eq!(artifact.digest, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(artifact.len, 0);
    }

    #[tokio::test]
    async fn test_digest_is_stable_and_fixed_length() {
        let mut temp_file = NamedTempFile::new().unwrap();
        // Spans several chunks with a ragged tail
        let data: Vec<u8> = (0..(DIGEST_CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        temp_file.write_all(&data).unwrap();

        let first = describe(temp_file.path()).await.unwrap();
        let second = describe(temp_file.path()).await.unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.digest.len(), SHA1_HEX_LEN);
        assert!(first.digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(first.len, data.len() as u64);

        let mut expected = Sha1::new();
        expected.update(&data);
        assert_eq!(first.digest, hex::encode(expected.finalize()));
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(sha1_hex(&temp.path().join("nope.zip")).await.is_err());
    }
}
