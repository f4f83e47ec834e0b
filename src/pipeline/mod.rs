//! The update pipeline.
//!
//! One [`Orchestrator`] owns one run: it validates preconditions, fetches the
//! source snapshot into a fresh [`RunWorkspace`], repackages and digests it,
//! publishes it, points the deployment descriptor at it, cleans up and
//! finally schedules a host restart.
//!
//! Progress is a stream of [`ProgressEvent`]s sent over a `tokio::sync::mpsc`
//! channel; whoever owns the terminal (or any other output) drains it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rpp_cli::pipeline::{Orchestrator, UpdateRequest};
//! use rpp_cli::publish::DropboxBackend;
//! use rpp_cli::source::GitHubSource;
//! # async fn example(config: rpp_cli::config::GlobalConfig) -> anyhow::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::channel::<rpp_cli::pipeline::ProgressEvent>(32);
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         println!("[{}] {}", event.stage, event.message);
//!     }
//! });
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(GitHubSource::new(config.github.token.clone())?),
//!     Arc::new(DropboxBackend::new(config.dropbox.clone())?),
//!     config.descriptor_path(),
//!     "/var/lib/rpp/work",
//!     tx,
//! );
//! let outcome = orchestrator
//!     .run(UpdateRequest {
//!         repository: "https://github.com/acme/pack".into(),
//!         branch: "main".into(),
//!         requested_by: "console".into(),
//!         publish_path: "/survival".into(),
//!     })
//!     .await?;
//! println!("{}", outcome.location.direct_url);
//! # Ok(())
//! # }
//! ```

pub mod guard;
pub mod orchestrator;
pub mod restart;
pub mod types;
pub mod workspace;

pub use guard::RunGuard;
pub use orchestrator::Orchestrator;
pub use restart::{HostControl, RestartPlan, ShellHostControl, schedule_restart};
pub use types::{ProgressEvent, RunFailure, RunOutcome, Severity, Stage, UpdateRequest};
pub use workspace::RunWorkspace;
