//! Delayed restart of the host service after a successful run.
//!
//! The host exposes two effects, both fire-and-forget: broadcasting a notice
//! to connected players and shutting down (a supervisor is expected to bring
//! the service back up with the new descriptor). Failures are logged and
//! never reach the pipeline result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RestartConfig;

/// Side effects on the host service.
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Show `message` to everyone connected.
    async fn broadcast(&self, message: &str) -> Result<()>;

    /// Stop the service so it restarts with the new configuration.
    async fn shutdown(&self) -> Result<()>;
}

/// When and how to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPlan {
    pub announce: bool,
    pub delay: Duration,
}

impl From<&RestartConfig> for RestartPlan {
    fn from(config: &RestartConfig) -> Self {
        Self {
            announce: config.announce,
            delay: config.delay(),
        }
    }
}

/// Countdown notice sent right after a successful run.
pub fn countdown_message(delay: Duration) -> String {
    format!(
        "Server will restart in {} seconds to apply the new resource pack…",
        delay.as_secs().max(1)
    )
}

/// Notice sent right before shutting down.
pub const RESTART_NOW_MESSAGE: &str = "Restarting now to apply the new resource pack…";

/// Spawn the restart sequence and return its handle.
pub fn schedule_restart(host: Arc<dyn HostControl>, plan: RestartPlan) -> JoinHandle<()> {
    tokio::spawn(async move {
        if plan.announce
            && let Err(e) = host.broadcast(&countdown_message(plan.delay)).await
        {
            warn!("Restart announcement failed: {:#}", e);
        }

        tokio::time::sleep(plan.delay).await;

        if let Err(e) = host.broadcast(RESTART_NOW_MESSAGE).await {
            warn!("Restart broadcast failed: {:#}", e);
        }
        match host.shutdown().await {
            Ok(()) => info!("Shutdown signal sent"),
            Err(e) => warn!("Shutdown failed: {:#}", e),
        }
    })
}

/// [`HostControl`] that runs configured shell commands.
///
/// `{message}` in the broadcast command is replaced with the notice text.
/// Unset commands are skipped.
#[derive(Debug, Clone, Default)]
pub struct ShellHostControl {
    broadcast_command: Option<String>,
    shutdown_command: Option<String>,
}

impl ShellHostControl {
    pub fn new(broadcast_command: Option<String>, shutdown_command: Option<String>) -> Self {
        Self {
            broadcast_command: broadcast_command.filter(|c| !c.trim().is_empty()),
            shutdown_command: shutdown_command.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn from_config(config: &RestartConfig) -> Self {
        Self::new(config.broadcast_command.clone(), config.shutdown_command.clone())
    }
}

#[async_trait]
impl HostControl for ShellHostControl {
    async fn broadcast(&self, message: &str) -> Result<()> {
        let Some(template) = &self.broadcast_command else {
            debug!("No broadcast command configured, skipping: {}", message);
            return Ok(());
        };
        run_shell(&template.replace("{message}", message)).await
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(command) = &self.shutdown_command else {
            warn!("No shutdown command configured; restart the server manually");
            return Ok(());
        };
        run_shell(command).await
    }
}

async fn run_shell(command: &str) -> Result<()> {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C");
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c");
        cmd
    };

    let output = cmd
        .arg(command)
        .output()
        .await
        .with_context(|| format!("Failed to run host command: {command}"))?;

    if !output.status.success() {
        bail!(
            "Host command exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
