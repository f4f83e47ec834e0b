//! RPP - ResourcepackPlus
//!
//! Rebuilds a game server's resource pack from a GitHub repository and rolls
//! it out: the branch snapshot is downloaded as a zip, repackaged so the
//! pack's `pack.mcmeta` sits at the archive root, digested with SHA-1,
//! published to a Dropbox folder behind a direct-download link, and the
//! server's `server.properties` is pointed at the new artifact before the
//! server is restarted.
//!
//! # Architecture Overview
//!
//! ```text
//! cli ──► pipeline::Orchestrator
//!            ├── source::SourceRepository   (GitHub zipball via fetch::ContentFetcher)
//!            ├── archive                    (repackage, extract)
//!            ├── checksum                   (SHA-1 artifact digest)
//!            ├── publish::Publisher         (clear, upload, share link)
//!            │     └── publish::StorageBackend (Dropbox)
//!            ├── descriptor                 (server.properties)
//!            └── pipeline::restart          (HostControl)
//! ```
//!
//! Collaborators are trait objects handed to the orchestrator by the caller;
//! nothing reaches for global configuration on its own.
//!
//! # Core Modules
//!
//! - [`cli`] - the `rpp` command surface
//! - [`config`] - global TOML configuration and pending link sessions
//! - [`core`] - error taxonomy and user-facing error rendering
//! - [`pipeline`] - the staged update run, single-flight guard and restart
//!
//! # Pipeline Steps
//!
//! - [`source`] - repository locators and the GitHub source
//! - [`fetch`] - authenticated streaming downloads with bounded redirects
//! - [`archive`] - root-prefix stripping and extraction of zip archives
//! - [`checksum`] - streaming SHA-1 digests
//! - [`publish`] - remote storage, Dropbox backend and share links
//! - [`descriptor`] - `.properties` editing that preserves unrelated lines
//!
//! # Supporting Modules
//!
//! - [`constants`] - timeouts, limits and well-known names
//! - [`utils`] - atomic writes, best-effort cleanup and progress rendering
//!
//! # Configuration (`~/.rpp/config.toml`)
//!
//! ```toml
//! publish_path = "/survival"
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
//! broadcast_command = "mcrcon say '{message}'"
//! shutdown_command = "mcrcon stop"
//! ```

pub mod archive;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod descriptor;
pub mod fetch;
pub mod pipeline;
pub mod publish;
pub mod source;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
