//! Core types shared across RPP.
//!
//! Currently this is the error taxonomy and its user-facing rendering; see
//! [`error`] for details.

pub mod error;

pub use error::{ErrorContext, RppError, user_friendly_error};
