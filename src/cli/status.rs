//! `rpp status` - what is configured and what the server currently serves.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::{CommandContext, mask_secret};
use crate::config::GlobalConfig;
use crate::core::RppError;
use crate::descriptor::DeploymentDescriptor;

#[derive(Args, Debug)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = GlobalConfig::load_with_optional(Some(ctx.config_path.clone())).await?;
        for line in render_status(ctx, &config).await {
            println!("{line}");
        }
        Ok(())
    }
}

async fn render_status(ctx: &CommandContext, config: &GlobalConfig) -> Vec<String> {
    let unset = || "not set".dimmed().to_string();
    let mut lines = vec![format!("{} {}", "Config:".bold(), ctx.config_path.display())];

    lines.push(format!(
        "{} {}",
        "GitHub token:".bold(),
        config.github_token().map_or_else(unset, mask_secret)
    ));

    let dropbox = if config.dropbox.is_complete() {
        let app_key = config.dropbox.app_key.as_deref().map_or_else(unset, mask_secret);
        format!("linked (app key {app_key})")
    } else {
        unset()
    };
    lines.push(format!("{} {}", "Dropbox:".bold(), dropbox));
    lines.push(format!(
        "{} {}",
        "Publish path:".bold(),
        config.publish_path().map_or_else(unset, str::to_string)
    ));

    let descriptor_path = config.descriptor_path();
    lines.push(format!("{} {}", "Descriptor:".bold(), descriptor_path.display()));
    match DeploymentDescriptor::load(&descriptor_path).await {
        Ok(descriptor) => {
            lines.push(format!(
                "  {} {}",
                "Pack URL:".bold(),
                descriptor.artifact_url().map_or_else(unset, str::to_string)
            ));
            lines.push(format!(
                "  {} {}",
                "Pack SHA-1:".bold(),
                descriptor.artifact_digest().map_or_else(unset, str::to_string)
            ));
        }
        Err(e) => {
            let reason = match e.downcast_ref::<RppError>() {
                Some(RppError::DescriptorNotFound { .. }) => "file not found".to_string(),
                _ => e.to_string(),
            };
            lines.push(format!("  {}", reason.yellow()));
        }
    }
    lines
}
