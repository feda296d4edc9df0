//! Error types for remote session operations.
//!
//! Errors are categorized so callers can tell a fatal transport problem
//! (the whole run must stop) from a failure scoped to a single command.

use std::fmt;
use std::io;

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of remote errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Host unreachable, timed out, or connection dropped.
    Connectivity,
    /// Credentials were rejected.
    Authentication,
    /// A remote command ran but reported failure.
    Command,
    /// Local tooling problem (missing `ssh`, spawn failure).
    Local,
}

impl ErrorCategory {
    /// Whether an error of this category must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connectivity | Self::Authentication | Self::Local)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connectivity => "Remote host unreachable",
            Self::Authentication => "Authentication rejected",
            Self::Command => "Remote command failed",
            Self::Local => "Local SSH tooling problem",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Connectivity => "Check the host address, port and network reachability",
            Self::Authentication => "Check the user name, password or private key path",
            Self::Command => "Inspect the command stderr shown above",
            Self::Local => "Make sure `ssh` (and `sshpass` for passwords) is on PATH",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to a remote host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport could not be established or was lost.
    #[error("cannot reach {host}: {message}")]
    Connectivity {
        /// Target host.
        host: String,
        /// Details from the transport.
        message: String,
    },

    /// The remote side refused the credentials.
    #[error("authentication to {host} failed: {message}")]
    Authentication {
        /// Target host.
        host: String,
        /// Details from the transport.
        message: String,
    },

    /// A remote command exited non-zero where success was required.
    #[error("remote command `{command}` exited with {exit_code}: {stderr}")]
    RemoteCommand {
        /// Command that was run.
        command: String,
        /// Exit status reported by the remote shell.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The session was already released.
    #[error("session to {host} has been disposed")]
    Disposed {
        /// Target host.
        host: String,
    },

    /// Local process spawning or pipe IO failed.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        /// Local program that could not be run.
        program: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create a connectivity error.
    pub fn connectivity(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connectivity {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connectivity { .. } | Self::Disposed { .. } => ErrorCategory::Connectivity,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::RemoteCommand { .. } => ErrorCategory::Command,
            Self::Spawn { .. } => ErrorCategory::Local,
        }
    }

    /// Whether this error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_categories() {
        assert!(ErrorCategory::Connectivity.is_fatal());
        assert!(ErrorCategory::Authentication.is_fatal());
        assert!(ErrorCategory::Local.is_fatal());
        assert!(!ErrorCategory::Command.is_fatal());
    }

    #[test]
    fn test_remote_command_is_not_fatal() {
        let err = Error::RemoteCommand {
            command: "mkdir -p /x".to_string(),
            exit_code: 1,
            stderr: "Permission denied".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Command);
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("exited with 1"));
    }

    #[test]
    fn test_authentication_display() {
        let err = Error::authentication("10.0.0.5", "Permission denied (publickey)");
        assert!(err.to_string().contains("10.0.0.5"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_advice_not_empty() {
        assert!(!ErrorCategory::Connectivity.advice().is_empty());
        assert!(!ErrorCategory::Authentication.advice().is_empty());
        assert!(!ErrorCategory::Command.advice().is_empty());
        assert!(!ErrorCategory::Local.advice().is_empty());
    }
}
