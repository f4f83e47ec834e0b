//! RPP CLI entry point
//!
//! Parses arguments, installs the log subscriber, runs the command and turns
//! failures into colored, actionable messages.

use anyhow::Result;
use clap::Parser;
use rpp_cli::cli;
use rpp_cli::core::error::user_friendly_error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = cli.build_config();

    init_logging(config.log_level.as_deref());

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute_with_config(config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins over the verbosity flags; the default is `warn`.
fn init_logging(flag_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(flag_level.unwrap_or("warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
