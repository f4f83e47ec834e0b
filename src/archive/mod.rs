//! Zip archive handling for resource packs.
//!
//! - [`repackage`] rewrites a source zipball so the pack root (the folder
//!   holding the marker file) becomes the archive root
//! - [`extract`] unpacks an artifact into a plain directory tree
//!
//! Both are synchronous and file-backed; async callers run them through
//! `tokio::task::spawn_blocking`.

pub mod extract;
pub mod repackage;

pub use extract::extract_to_dir;
pub use repackage::{RepackageSummary, find_root_prefix, repackage};
