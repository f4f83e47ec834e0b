//! Terminal rendering of pipeline progress.
//!
//! The pipeline never writes to the terminal itself. It sends
//! [`ProgressEvent`]s over a channel and [`render_progress`] drains them on
//! its own task, driving an `indicatif` spinner for the active stage and
//! printing one line per finished stage.
//!
//! Progress output is hidden when `RPP_NO_PROGRESS` is set, when
//! `--no-progress` is passed, or when stderr is not a terminal; messages are
//! then printed as plain lines.

use std::io::IsTerminal;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::pipeline::{ProgressEvent, Severity};

fn is_progress_disabled() -> bool {
    std::env::var("RPP_NO_PROGRESS").is_ok() || !std::io::stderr().is_terminal()
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
}

/// Spinner for the currently running stage.
pub struct StageSpinner {
    inner: ProgressBar,
}

impl StageSpinner {
    /// Create a spinner, hidden when progress output is disabled.
    pub fn new(enabled: bool) -> Self {
        let inner = if enabled && !is_progress_disabled() {
            let bar = ProgressBar::new_spinner();
            bar.set_style(spinner_style());
            bar.set_prefix("rpp");
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { inner }
    }

    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Print a line above the spinner, or straight to stderr when hidden.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.is_hidden() {
            eprintln!("{}", line.as_ref());
        } else {
            self.inner.println(line.as_ref());
        }
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Format one event as a terminal line.
pub fn format_event(event: &ProgressEvent) -> String {
    let stage = format!("[{}]", event.stage).dimmed();
    match event.severity {
        Severity::Info => format!("{} {} {}", "✓".green(), stage, event.message),
        Severity::Warning => format!("{} {} {}", "!".yellow(), stage, event.message.yellow()),
        Severity::Error => format!("{} {} {}", "✗".red(), stage, event.message.red()),
    }
}

/// Drain `events` until the sender is dropped, rendering each one.
///
/// Returns the number of events rendered.
pub async fn render_progress(mut events: mpsc::Receiver<ProgressEvent>, enabled: bool) -> usize {
    let spinner = StageSpinner::new(enabled);
    let mut rendered = 0;

    while let Some(event) = events.recv().await {
        spinner.println(format_event(&event));
        spinner.set_message(event.stage.describe().to_string());
        rendered += 1;
    }

    spinner.finish_and_clear();
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

    #[tokio::test]
    async fn test_render_drains_until_sender_drops() {
        let (tx, rx) = mpsc::channel(8);
        let renderer = tokio::spawn(render_progress(rx, false));

        tx.send(ProgressEvent::info(Stage::FetchingSource, "Downloading")).await.unwrap();
        tx.send(ProgressEvent::warning(Stage::Extracting, "Could not extract")).await.unwrap();
        drop(tx);

        assert_eq!(renderer.await.unwrap(), 2);
    }

    #[test]
    fn test_format_event_includes_stage_and_message() {
        let line = format_event(&ProgressEvent::error(Stage::Uploading, "boom"));
        assert!(line.contains("[Uploading]"));
        assert!(line.contains("boom"));
    }
}
