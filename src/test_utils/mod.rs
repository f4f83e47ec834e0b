//! Test utilities for RPP
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite.
//!
//! - [`fixtures`] - zip archive builders shaped like code host snapshots
//! - [`fakes`] - in-memory source, storage and host collaborators
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rpp_cli::test_utils::fakes::{FakeSource, FakeStorage};
//! use rpp_cli::test_utils::fixtures::sample_zipball;
//!
//! let source = Arc::new(FakeSource::serving(sample_zipball()));
//! let storage = Arc::new(FakeStorage::new());
//! assert_eq!(storage.calls().total(), 0);
//! # let _ = source;
//! ```

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeSource, FakeStorage, HostCall, RecordingHost};
pub use fixtures::{ZipFixture, read_entries, sample_zipball};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests, once per process.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging
/// stays off.
///
/// ```bash
/// RUST_LOG=rpp_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
