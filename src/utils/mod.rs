//! Shared helpers that do not belong to a single pipeline stage.
//!
//! - [`fs`] - atomic writes and best-effort directory removal
//! - [`progress`] - terminal rendering of progress events

pub mod fs;
pub mod progress;

pub use fs::{atomic_write, remove_dir_best_effort};
pub use progress::{StageSpinner, format_event, render_progress};
