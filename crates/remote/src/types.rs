//! Core types for remote sessions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How to authenticate against the remote host.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Password authentication (requires `sshpass`).
    Password(String),
    /// Private key authentication.
    KeyFile(PathBuf),
}

// Never print the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(***)"),
            Self::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

/// Connection parameters for a single host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Host name or IP address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Remote account. Commands run with its privileges.
    pub user: String,
    /// Authentication material.
    pub credentials: Credentials,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Verify the host key against `known_hosts`.
    pub strict_host_key_checking: bool,
    /// Upper bound for a single remote command. `None` waits forever.
    pub command_timeout: Option<Duration>,
}

impl HostConfig {
    /// Create a config with default port, timeout and host key checking.
    pub fn new(host: impl Into<String>, user: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            credentials,
            connect_timeout: Duration::from_secs(15),
            strict_host_key_checking: true,
            command_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// `user@host` destination string.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Captured result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Build an output from string parts.
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// A file to place on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Absolute remote path.
    pub path: String,
    /// Full file content.
    pub content: Vec<u8>,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}
