//! Error types for menu reconciliation.
//!
//! Errors are categorized so the retry loop and the caller can tell a
//! transient network hiccup from a rejected credential or a refused call.

use crate::types::Phase;
use std::fmt;

/// Result type alias for menu operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of menu errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport failure or timeout (transient, retryable).
    Network,
    /// Credentials rejected (aborts the run).
    Auth,
    /// The server refused a single call.
    Api,
    /// The server answered with something unexpected (one entry only,
    /// unless it happened while listing).
    Format,
    /// The run was cancelled.
    Cancelled,
    /// The declared menu or options are invalid.
    Config,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Whether this error stops the whole run rather than one entry.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Api | Self::Format)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Authentication failed",
            Self::Api => "Request rejected by the server",
            Self::Format => "Unexpected server response",
            Self::Cancelled => "Cancelled",
            Self::Config => "Invalid menu configuration",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the API URL and that the CMS is running",
            Self::Auth => "Check NOCODEPLOY_API_ACCOUNT and NOCODEPLOY_API_PASSWORD",
            Self::Api => "See the server message; other entries were still processed",
            Self::Format => "Check the endpoint paths in the [api] section",
            Self::Cancelled => "Run the sync again to finish reconciling",
            Self::Config => "Fix the [menus] section of the config file",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the menu API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sign-in was rejected.
    #[error("sign-in failed{}: {message}", status_suffix(.status))]
    Auth {
        /// HTTP status if the server answered.
        status: Option<u16>,
        /// Server-provided body or reason.
        message: String,
    },

    /// A non-2xx response to anything other than sign-in.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Api {
        /// Operation that was attempted.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Server-provided error body.
        body: String,
    },

    /// Transport error or timeout.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// Response body could not be understood.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// The listing did not include every entry.
    #[error("listing returned {returned} of {total} entries; raise menus.page_size")]
    Truncated {
        /// Entries in the response.
        returned: usize,
        /// Entries the server reported.
        total: usize,
    },

    /// A full page came back and the server reported no total.
    #[error("listing filled the whole page of {page_size} entries without a total; raise menus.page_size")]
    PageFull {
        /// Page size that was requested.
        page_size: usize,
    },

    /// Cancellation was requested.
    #[error("cancelled after phase '{after}'")]
    Cancelled {
        /// Last phase that completed.
        after: Phase,
    },

    /// Invalid declared menu.
    #[error("invalid menu: {0}")]
    InvalidMenu(String),

    /// Invalid purge pattern.
    #[error("invalid purge pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Auth { .. } => ErrorCategory::Auth,
            Error::Api { .. } => ErrorCategory::Api,
            Error::Network { .. } => ErrorCategory::Network,
            Error::InvalidResponse(_) | Error::Truncated { .. } | Error::PageFull { .. } => {
                ErrorCategory::Format
            }
            Error::Cancelled { .. } => ErrorCategory::Cancelled,
            Error::InvalidMenu(_) | Error::Pattern(_) => ErrorCategory::Config,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error stops the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }
}

#[allow(clippy::ref_option)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Api {
                operation: "request".to_string(),
                status: code,
                body: String::new(),
            },
            other => Self::network(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
