//! `rpp update REPOSITORY BRANCH` - rebuild and roll out the resource pack.
//!
//! Builds the real collaborators from the global config, runs the pipeline
//! while a renderer task prints its progress, and then waits for the
//! scheduled restart so the process outlives the countdown.
//!
//! ```bash
//! rpp update https://github.com/acme/pack main
//! rpp update git@github.com:acme/pack.git release --no-progress
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::sync::mpsc;
use tracing::debug;

use super::CommandContext;
use crate::config::{GlobalConfig, current_actor};
use crate::pipeline::{Orchestrator, RestartPlan, RunOutcome, ShellHostControl, UpdateRequest};
use crate::publish::DropboxBackend;
use crate::source::GitHubSource;
use crate::utils::progress::render_progress;

#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Repository URL (https or ssh) or owner/name
    repository: String,

    /// Branch to publish
    branch: String,
}

impl UpdateCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = GlobalConfig::load_with_optional(Some(ctx.config_path.clone())).await?;
        let work_dir = config.work_dir(&ctx.config_path);
        debug!("Using work directory {}", work_dir.display());

        let source = GitHubSource::new(config.github.token.clone())?
            .with_api_base(ctx.github_api_base.clone());
        let backend = DropboxBackend::new(config.dropbox.clone())?
            .with_base_urls(&ctx.dropbox_api_base, &ctx.dropbox_content_base);
        let host = ShellHostControl::from_config(&config.restart);

        let (tx, rx) = mpsc::channel(64);
        let renderer = tokio::spawn(render_progress(rx, !ctx.no_progress));

        let orchestrator = Orchestrator::new(
            Arc::new(source),
            Arc::new(backend),
            config.descriptor_path(),
            work_dir,
            tx,
        )
        .with_restart(Arc::new(host), RestartPlan::from(&config.restart));

        let request = UpdateRequest {
            repository: self.repository,
            branch: self.branch,
            requested_by: current_actor(),
            publish_path: config.publish_path().unwrap_or_default().to_string(),
        };

        // The orchestrator owns the only sender, so the renderer stops once
        // the run returns.
        let result = orchestrator.run(request).await;
        renderer.await.context("Progress renderer panicked")?;

        let outcome = result?;
        print_summary(&outcome);

        if let Some(restart) = outcome.restart {
            restart.await.context("Restart task panicked")?;
        }
        Ok(())
    }
}

fn print_summary(outcome: &RunOutcome) {
    println!("{}", "Resource pack published".green().bold());
    println!("  URL:   {}", outcome.location.direct_url);
    println!("  SHA-1: {}", outcome.artifact.digest);
    println!("  Size:  {} bytes", outcome.artifact.len);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RppError;
    use crate::pipeline::{RunFailure, Stage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_token_fails_in_validation() {
        let temp = TempDir::new().unwrap();
        let ctx = CommandContext::new(temp.path().join("config.toml")).with_no_progress(true);

        let err = UpdateCommand {
            repository: "acme/pack".into(),
            branch: "main".into(),
        }
        .execute(&ctx)
        .await
        .unwrap_err();

        let failure = err.downcast_ref::<RunFailure>().unwrap();
        assert_eq!(failure.stage, Stage::Validating);
        assert!(matches!(
            failure.error.downcast_ref::<RppError>(),
            Some(RppError::PreconditionMissing { .. })
        ));
    }
}
