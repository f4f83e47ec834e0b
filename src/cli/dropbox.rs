//! Linking a Dropbox app: `dropbox`, `dropbox-code` and `dropbox-path`.
//!
//! The OAuth code flow spans two invocations. `rpp dropbox <key> <secret>`
//! parks the app credentials in a pending session and prints the authorize
//! URL; `rpp dropbox-code <code>` consumes that session, trades the code for
//! a refresh token and stores all three values in the global config.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tracing::{debug, warn};

use super::CommandContext;
use crate::config::{DropboxCredentials, GlobalConfig, PendingLink, PendingLinkStore, current_actor};
use crate::constants::PENDING_SESSION_TTL;
use crate::core::RppError;
use crate::publish::StorageBackend;
use crate::publish::dropbox::{DropboxBackend, authorize_url, exchange_code};

/// Start linking a Dropbox app.
#[derive(Args, Debug)]
pub struct DropboxCommand {
    /// App key from the Dropbox App Console
    #[arg(requires = "app_secret")]
    app_key: Option<String>,

    /// App secret from the Dropbox App Console
    app_secret: Option<String>,
}

impl DropboxCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let (Some(app_key), Some(app_secret)) = (self.app_key, self.app_secret) else {
            print_setup_steps();
            return Ok(());
        };

        let actor = current_actor();
        let link = PendingLink::new(
            app_key.trim().to_string(),
            app_secret.trim().to_string(),
            Utc::now(),
            PENDING_SESSION_TTL,
        );
        PendingLinkStore::beside(&ctx.config_path).put(&actor, link).await?;
        debug!("Pending Dropbox link recorded for {}", actor);

        println!("Open this URL, allow access and copy the code Dropbox shows:");
        println!("  {}", authorize_url(&app_key).underline());
        println!(
            "Then run {} within {} minutes",
            "rpp dropbox-code <code>".yellow(),
            PENDING_SESSION_TTL.as_secs() / 60
        );
        Ok(())
    }
}

fn print_setup_steps() {
    println!("{}", "Link a Dropbox app".bold());
    println!("  1. Create an app at https://www.dropbox.com/developers/apps");
    println!("  2. Under Permissions enable files.content.read, files.content.write,");
    println!("     sharing.read and sharing.write");
    println!("  3. Run {}", "rpp dropbox <appKey> <appSecret>".yellow());
}

/// Finish linking with the authorization code.
#[derive(Args, Debug)]
pub struct DropboxCodeCommand {
    /// Code displayed by Dropbox after authorizing the app
    code: String,
}

impl DropboxCodeCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let actor = current_actor();
        let pending =
            PendingLinkStore::beside(&ctx.config_path).take(&actor, Utc::now()).await?;

        let refresh_token = exchange_code(
            &ctx.dropbox_api_base,
            &pending.app_key,
            &pending.app_secret,
            &self.code,
        )
        .await?;

        let credentials = DropboxCredentials {
            app_key: Some(pending.app_key),
            app_secret: Some(pending.app_secret),
            refresh_token: Some(refresh_token),
        };

        let mut config = GlobalConfig::load_with_optional(Some(ctx.config_path.clone())).await?;
        config.dropbox = credentials.clone();
        config.save_to(&ctx.config_path).await.context("Failed to save Dropbox credentials")?;

        let backend = DropboxBackend::new(credentials)?
            .with_base_urls(&ctx.dropbox_api_base, &ctx.dropbox_content_base);
        let account = match backend.account_name().await {
            Ok(name) => name,
            Err(e) => {
                warn!("Dropbox account lookup failed: {:#}", e);
                "Unknown Account".to_string()
            }
        };

        println!("{} Dropbox linked to {}", "✓".green(), account.bold());
        if config.publish_path().is_none() {
            println!("Next, choose a folder with {}", "rpp dropbox-path <path>".yellow());
        }
        Ok(())
    }
}

/// Set the Dropbox folder the pack is published to.
#[derive(Args, Debug)]
pub struct DropboxPathCommand {
    /// Folder inside the Dropbox app, e.g. /survival
    path: String,
}

impl DropboxPathCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let mut config = GlobalConfig::load_with_optional(Some(ctx.config_path.clone())).await?;
        if !config.dropbox.is_complete() {
            return Err(RppError::PreconditionMissing {
                what: "Dropbox credentials".to_string(),
                hint: "rpp dropbox <appKey> <appSecret>".to_string(),
            }
            .into());
        }

        let trimmed = self.path.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Err(RppError::ConfigError {
                message: "The publish path must name a folder, e.g. /survival".to_string(),
            }
            .into());
        }

        let path = config.set_publish_path(trimmed).to_string();
        config.save_to(&ctx.config_path).await.context("Failed to save the publish path")?;

        println!("{} Publish path set to {}", "✓".green(), path.bold());
        println!(
            "{} Every update deletes everything in this folder. Do not share it between servers",
            "!".yellow().bold()
        );
        Ok(())
    }
}
