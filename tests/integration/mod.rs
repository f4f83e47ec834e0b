//! Integration test suite for RPP
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **pipeline**: full update runs against in-memory source, storage and host
//! - **cli**: the `rpp` binary's argument handling and error output

mod cli;
mod pipeline;
