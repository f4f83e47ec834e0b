//! Global constants used throughout the RPP codebase.
//!
//! Timeouts, limits and well-known names that several modules share live
//! here so the magic values stay discoverable.

use std::time::Duration;

/// Timeout for the lightweight credential check run by `rpp github` (10 seconds).
///
/// This is the only outbound call with a deadline; the update pipeline itself
/// runs until a stage fails or every stage completes.
pub const CREDENTIAL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of redirects the content fetcher follows before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Chunk size used when streaming files through the digest (8 KiB).
pub const DIGEST_CHUNK_SIZE: usize = 8 * 1024;

/// Number of response body bytes kept for diagnostics on HTTP failures.
pub const ERROR_BODY_SNIPPET_LEN: usize = 512;

/// File whose location inside the source archive marks the pack root.
pub const ROOT_MARKER_FILE: &str = "pack.mcmeta";

/// Deployment descriptor file name, relative to the server root.
pub const DESCRIPTOR_FILE_NAME: &str = "server.properties";

/// Descriptor key holding the public artifact URL.
pub const DESCRIPTOR_URL_KEY: &str = "resource-pack";

/// Descriptor key holding the artifact's SHA-1 digest.
pub const DESCRIPTOR_DIGEST_KEY: &str = "resource-pack-sha1";

/// Default delay between a successful run and the host shutdown signal.
pub const DEFAULT_RESTART_DELAY_SECS: u64 = 10;

/// Lower bound for the restart delay; shorter values are clamped up.
pub const MIN_RESTART_DELAY_SECS: u64 = 1;

/// How long a pending Dropbox link session stays valid (10 minutes).
pub const PENDING_SESSION_TTL: Duration = Duration::from_secs(600);

/// Name of the single-flight lock file inside the work directory.
pub const UPDATE_LOCK_FILE: &str = ".update.lock";

/// User agent sent to every remote provider.
pub fn user_agent() -> String {
    format!("rpp/{}", env!("CARGO_PKG_VERSION"))
}
