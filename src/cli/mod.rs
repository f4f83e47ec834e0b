//! Command-line interface for RPP (ResourcepackPlus).
//!
//! # Available Commands
//!
//! ## Linking accounts
//! - `github [TOKEN]` - validate and store a GitHub personal access token
//! - `dropbox [APP_KEY APP_SECRET]` - start linking a Dropbox app
//! - `dropbox-code CODE` - finish linking with the code Dropbox displayed
//! - `dropbox-path PATH` - choose the Dropbox folder the pack is published to
//!
//! ## Publishing
//! - `update REPOSITORY BRANCH` - rebuild, publish and roll out the pack
//! - `status` - show what is configured and what the server currently serves
//!
//! # Typical Setup
//!
//! ```bash
//! rpp github ghp_xxxxxxxxxxxx
//! rpp dropbox abc123key def456secret
//! rpp dropbox-code XXXXXXXXXXXXXXXX
//! rpp dropbox-path /survival
//! rpp update https://github.com/acme/pack main
//! ```
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Only errors are logged
//! - `--no-progress` - Disable spinners
//! - `--config` - Path to a custom config file

mod dropbox;
mod github;
mod status;
mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::resolve_config_path;
use crate::publish::dropbox::{DROPBOX_API_BASE, DROPBOX_CONTENT_BASE};
use crate::source::github::GITHUB_API_BASE;

pub use dropbox::{DropboxCodeCommand, DropboxCommand, DropboxPathCommand};
pub use github::GithubCommand;
pub use status::StatusCommand;
pub use update::UpdateCommand;

/// Runtime configuration derived from the global flags.
///
/// Passed explicitly to every command instead of being exported through
/// environment variables, so tests can run commands side by side.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter for `tracing-subscriber`, when a flag selected one.
    ///
    /// `None` keeps `RUST_LOG` or the default `warn`.
    pub log_level: Option<String>,

    /// Disable spinners and animated output.
    pub no_progress: bool,

    /// Custom path to the global configuration file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything a command needs to run.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Resolved config file location
    pub config_path: PathBuf,
    /// Disable spinners
    pub no_progress: bool,
    /// GitHub REST endpoint
    pub github_api_base: String,
    /// Dropbox RPC endpoint
    pub dropbox_api_base: String,
    /// Dropbox content endpoint
    pub dropbox_content_base: String,
}

impl CommandContext {
    /// Context talking to the public GitHub and Dropbox endpoints.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            no_progress: false,
            github_api_base: GITHUB_API_BASE.to_string(),
            dropbox_api_base: DROPBOX_API_BASE.to_string(),
            dropbox_content_base: DROPBOX_CONTENT_BASE.to_string(),
        }
    }

    #[must_use]
    pub fn with_no_progress(mut self, no_progress: bool) -> Self {
        self.no_progress = no_progress;
        self
    }
}

/// ResourcepackPlus command line.
#[derive(Parser)]
#[command(
    name = "rpp",
    about = "ResourcepackPlus - publish a server resource pack from a GitHub repository",
    version,
    long_about = "RPP downloads a resource pack from GitHub, repackages it, uploads it to Dropbox, \
                  points server.properties at the new download and restarts the server."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (equivalent to `RUST_LOG=debug`)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a custom global configuration file
    #[arg(short, long, global = true, env = "RPP_CONFIG")]
    config: Option<PathBuf>,

    /// Disable progress spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and store a GitHub personal access token
    Github(GithubCommand),

    /// Start linking a Dropbox app
    Dropbox(DropboxCommand),

    /// Finish linking Dropbox with an authorization code
    DropboxCode(DropboxCodeCommand),

    /// Set the Dropbox folder the pack is published to
    DropboxPath(DropboxPathCommand),

    /// Rebuild the pack from a repository and roll it out
    Update(UpdateCommand),

    /// Show configuration and the currently served pack
    Status(StatusCommand),
}

impl Cli {
    /// Run the selected command with configuration built from the flags.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Run the selected command with an explicit [`CliConfig`].
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let ctx = CommandContext::new(resolve_config_path(config.config_path)?)
            .with_no_progress(config.no_progress);

        match self.command {
            Commands::Github(cmd) => cmd.execute(&ctx).await,
            Commands::Dropbox(cmd) => cmd.execute(&ctx).await,
            Commands::DropboxCode(cmd) => cmd.execute(&ctx).await,
            Commands::DropboxPath(cmd) => cmd.execute(&ctx).await,
            Commands::Update(cmd) => cmd.execute(&ctx).await,
            Commands::Status(cmd) => cmd.execute(&ctx).await,
        }
    }
}

/// Hide all but the last four characters of a secret.
pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}
