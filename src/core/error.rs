//! Error handling for RPP
//!
//! This module provides the error taxonomy of the update pipeline and the
//! user-facing rendering of failures. The design follows two rules:
//! 1. **Strongly-typed errors** at the leaves, so callers and tests can
//!    `downcast_ref::<RppError>()` through any amount of `anyhow` context
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`RppError`] - Enumerated error types for every failure case in RPP
//! - [`ErrorContext`] - Wrapper that adds user-friendly suggestions and details
//!
//! Stage failures of the update pipeline arrive wrapped in
//! [`RunFailure`](crate::pipeline::RunFailure); [`user_friendly_error`] unwraps
//! them and names the stage in the rendered details.
//!
//! # Examples
//!
//! ```rust,no_run
//! use rpp_cli::core::{RppError, user_friendly_error};
//!
//! let err = anyhow::Error::from(RppError::PreconditionMissing {
//!     what: "GitHub token".to_string(),
//!     hint: "rpp github <token>".to_string(),
//! });
//! user_friendly_error(err).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::pipeline::RunFailure;

/// The main error type for RPP operations.
///
/// Variants group into:
///
/// ## Preconditions and input
/// - [`PreconditionMissing`](Self::PreconditionMissing) - credential or publish path absent
/// - [`ParseFailure`](Self::ParseFailure) - unrecognized repository locator
/// - [`RunInProgress`](Self::RunInProgress) - another update holds the single-flight lock
///
/// ## Remote providers
/// - [`AuthFailure`](Self::AuthFailure) - a provider rejected a stored credential
/// - [`Unauthorized`](Self::Unauthorized), [`NotFound`](Self::NotFound),
///   [`RedirectLoop`](Self::RedirectLoop), [`TransferFailure`](Self::TransferFailure) - download and upload failures
/// - [`PublishConflict`](Self::PublishConflict) - share link already exists (handled by fallback)
/// - [`RemoteNotFound`](Self::RemoteNotFound) - remote path missing
/// - [`TimedOut`](Self::TimedOut) - a bounded call exceeded its deadline
///
/// ## Local artifacts
/// - [`NoRootMarkerFound`](Self::NoRootMarkerFound), [`ArchiveFormatError`](Self::ArchiveFormatError)
/// - [`DescriptorNotFound`](Self::DescriptorNotFound), [`MetadataWriteFailure`](Self::MetadataWriteFailure)
/// - [`CleanupWarning`](Self::CleanupWarning) - logged only, never flips a run to failed
#[derive(Error, Debug)]
pub enum RppError {
    /// A required credential or setting has not been configured
    #[error("Missing {what}. Use `{hint}` first")]
    PreconditionMissing {
        /// Human name of the missing item
        what: String,
        /// Command that provides it
        hint: String,
    },

    /// Repository URL could not be parsed into an owner/name pair
    #[error("Could not parse repository locator '{input}'. Expected like: https://github.com/<owner>/<repo>")]
    ParseFailure {
        /// The rejected input
        input: String,
    },

    /// Remote service rejected the configured credential
    #[error("{service} rejected the configured credential: {reason}")]
    AuthFailure {
        /// Provider name
        service: String,
        /// Provider response
        reason: String,
    },

    /// Download was refused with 401/403
    #[error("Access denied (HTTP {status}) for {url}")]
    Unauthorized {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body snippet
        body: String,
    },

    /// Download target does not exist
    #[error("Not found (HTTP 404): {url}")]
    NotFound {
        /// Requested URL
        url: String,
        /// Response body snippet
        body: String,
    },

    /// Redirect chain exceeded the hop limit
    #[error("Too many redirects ({hops}) starting from {url}")]
    RedirectLoop {
        /// Original URL
        url: String,
        /// Hops followed before giving up
        hops: usize,
    },

    /// Network or provider failure while moving bytes
    #[error("Transfer failed during {operation}: {reason}")]
    TransferFailure {
        /// Operation being performed
        operation: String,
        /// HTTP status when one was received
        status: Option<u16>,
        /// Failure description, including any body snippet
        reason: String,
    },

    /// Source archive does not contain the root marker file
    #[error("{marker} not found in archive")]
    NoRootMarkerFound {
        /// Marker basename that was searched for
        marker: String,
    },

    /// Archive container is malformed
    #[error("Invalid archive {path}: {reason}")]
    ArchiveFormatError {
        /// Archive path
        path: String,
        /// Reader error
        reason: String,
    },

    /// A public link already exists for the remote path
    #[error("Shared link already exists for {path}")]
    PublishConflict {
        /// Remote path
        path: String,
    },

    /// Remote path does not exist on the publish backend
    #[error("Remote path not found: {path}")]
    RemoteNotFound {
        /// Remote path
        path: String,
    },

    /// Deployment descriptor file is missing
    #[error("Deployment descriptor not found at {path}")]
    DescriptorNotFound {
        /// Expected location
        path: String,
    },

    /// Deployment descriptor could not be written
    #[error("Failed to write deployment descriptor {path}: {reason}")]
    MetadataWriteFailure {
        /// Descriptor path
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Best-effort cleanup did not complete
    #[error("Cleanup of {path} incomplete: {reason}")]
    CleanupWarning {
        /// Path that could not be removed
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Another update run holds the lock
    #[error("An update is already in progress (lock held at {lock_path})")]
    RunInProgress {
        /// Lock file path
        lock_path: String,
    },

    /// A bounded operation did not finish in time
    #[error("{operation} timed out after {seconds}s")]
    TimedOut {
        /// Operation that timed out
        operation: String,
        /// Deadline in seconds
        seconds: u64,
    },

    /// No pending provider-link session for the actor
    #[error("No pending Dropbox link for '{actor}'")]
    NoPendingSession {
        /// Actor identity
        actor: String,
    },

    /// Pending provider-link session is past its expiry
    #[error("Dropbox link request for '{actor}' expired")]
    SessionExpired {
        /// Actor identity
        actor: String,
    },

    /// Configuration file problem
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl RppError {
    /// Short machine-friendly category name, used in progress events and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PreconditionMissing { .. } => "PreconditionMissing",
            Self::ParseFailure { .. } => "ParseFailure",
            Self::AuthFailure { .. } => "AuthFailure",
            Self::Unauthorized { .. } => "Unauthorized",
            Self::NotFound { .. } => "NotFound",
            Self::RedirectLoop { .. } => "RedirectLoop",
            Self::TransferFailure { .. } => "TransferFailure",
            Self::NoRootMarkerFound { .. } => "NoRootMarkerFound",
            Self::ArchiveFormatError { .. } => "ArchiveFormatError",
            Self::PublishConflict { .. } => "PublishConflict",
            Self::RemoteNotFound { .. } => "RemoteNotFound",
            Self::DescriptorNotFound { .. } => "DescriptorNotFound",
            Self::MetadataWriteFailure { .. } => "MetadataWriteFailure",
            Self::CleanupWarning { .. } => "CleanupWarning",
            Self::RunInProgress { .. } => "RunInProgress",
            Self::TimedOut { .. } => "TimedOut",
            Self::NoPendingSession { .. } => "NoPendingSession",
            Self::SessionExpired { .. } => "SessionExpired",
            Self::ConfigError { .. } => "ConfigError",
            Self::IoError(_) => "IoError",
            Self::Other { .. } => "Other",
        }
    }
}

/// Error with user-facing suggestion and details.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: RppError,
    /// What the user can do about it
    pub suggestion: Option<String>,
    /// Extra background, such as the failing stage or cause chain
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error without suggestion or details.
    #[must_use]
    pub const fn new(error: RppError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions.
///
/// Pipeline [`RunFailure`]s are unwrapped so the stage name lands in the
/// details; typed [`RppError`]s get a tailored suggestion; anything else is
/// reported with its full cause chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let error = match error.downcast::<RunFailure>() {
        Ok(failure) => {
            let stage = failure.stage;
            let mut ctx = user_friendly_error(failure.error);
            let stage_line = format!("Update failed while {}", stage.describe());
            ctx.details = Some(match ctx.details.take() {
                Some(existing) => format!("{stage_line}\n{existing}"),
                None => stage_line,
            });
            return ctx;
        }
        Err(other) => other,
    };

    let chain = cause_chain(&error);

    let ctx = match error.downcast::<RppError>() {
        Ok(rpp_error) => create_error_context(rpp_error),
        Err(other) => match other.downcast::<std::io::Error>() {
            Ok(io_error) => io_error_context(io_error),
            Err(other) => ErrorContext::new(RppError::Other {
                message: other.to_string(),
            }),
        },
    };

    match (ctx.details.is_none(), chain) {
        (true, Some(chain)) => ctx.with_details(chain),
        _ => ctx,
    }
}

fn cause_chain(error: &anyhow::Error) -> Option<String> {
    let chain: Vec<String> = error.chain().map(std::string::ToString::to_string).collect();
    if chain.len() < 2 {
        return None;
    }

    let mut message = String::from("Caused by:");
    for (i, cause) in chain.iter().enumerate() {
        message.push_str(&format!("\n  {}: {}", i + 1, cause));
    }
    Some(message)
}

fn io_error_context(io_error: std::io::Error) -> ErrorContext {
    let suggestion = match io_error.kind() {
        std::io::ErrorKind::PermissionDenied => {
            Some("Check file ownership and permissions of the server and work directories")
        }
        std::io::ErrorKind::NotFound => {
            Some("Check that the file or directory exists and the path is correct")
        }
        _ => None,
    };
    let ctx = ErrorContext::new(RppError::IoError(io_error));
    match suggestion {
        Some(s) => ctx.with_suggestion(s),
        None => ctx,
    }
}

fn create_error_context(error: RppError) -> ErrorContext {
    let suggestion: Option<String> = match &error {
        RppError::PreconditionMissing { hint, .. } => Some(format!("Run `{hint}`")),
        RppError::ParseFailure { .. } => Some(
            "Pass an HTTPS browse URL (https://github.com/owner/repo), an SSH locator (git@github.com:owner/repo.git) or owner/repo".to_string(),
        ),
        RppError::AuthFailure { service, .. } => Some(format!(
            "Re-link {service}: run `rpp github <token>` or `rpp dropbox <appKey> <appSecret>` again"
        )),
        RppError::Unauthorized { .. } => Some(
            "Check that the GitHub token has the 'repo' scope and access to this repository".to_string(),
        ),
        RppError::NotFound { .. } => {
            Some("Verify the repository name and that the branch exists".to_string())
        }
        RppError::NoRootMarkerFound { marker } => Some(format!(
            "Make sure the repository contains a {marker} file at the pack root"
        )),
        RppError::DescriptorNotFound { .. } => Some(
            "Set `server_root` in the config or run rpp from the server directory".to_string(),
        ),
        RppError::RunInProgress { .. } => {
            Some("Wait for the running update to finish before starting another".to_string())
        }
        RppError::TimedOut { .. } => {
            Some("Check your network connection and try again".to_string())
        }
        RppError::NoPendingSession { .. } | RppError::SessionExpired { .. } => {
            Some("Run `rpp dropbox <appKey> <appSecret>` to start linking again".to_string())
        }
        RppError::ConfigError { .. } => {
            Some("Inspect the config file shown by `rpp status`".to_string())
        }
        _ => None,
    };

    let ctx = ErrorContext::new(error);
    match suggestion {
        Some(s) => ctx.with_suggestion(s),
        None => ctx,
    }
}
