//! `rpp github [TOKEN]` - store a GitHub personal access token.
//!
//! Without a token, prints how to create one. With a token, asks GitHub who
//! it belongs to (bounded by a 10 second deadline) and only then saves it.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::debug;

use super::CommandContext;
use crate::config::GlobalConfig;
use crate::source::{GitHubSource, SourceRepository};

#[derive(Args, Debug)]
pub struct GithubCommand {
    /// Personal access token with read access to the pack repository
    token: Option<String>,
}

impl GithubCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let Some(token) = self.token.filter(|t| !t.trim().is_empty()) else {
            print_instructions();
            return Ok(());
        };
        let token = token.trim().to_string();

        println!("{}", "Validating GitHub token…".cyan());
        let source =
            GitHubSource::new(Some(token.clone()))?.with_api_base(ctx.github_api_base.clone());
        let identity = source.validate_credential().await?;
        debug!("Token belongs to {}", identity.login);

        let mut config = GlobalConfig::load_with_optional(Some(ctx.config_path.clone())).await?;
        config.github.token = Some(token);
        config.save_to(&ctx.config_path).await.context("Failed to save the GitHub token")?;

        println!("{} GitHub token saved for {}", "✓".green(), identity.login.bold());
        Ok(())
    }
}

fn print_instructions() {
    println!("{}", "Link a GitHub account".bold());
    println!("  1. Open https://github.com/settings/tokens");
    println!("  2. Generate a token with read access to the resource pack repository");
    println!("  3. Run {}", "rpp github <token>".yellow());
}
