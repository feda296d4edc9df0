//! # remote
//!
//! One authenticated channel to one host.
//!
//! - [`SshSession`]: control-master SSH session (password or key)
//! - [`RemoteShell`]: command execution plus idempotent file primitives
//! - [`MemoryHost`]: in-memory host for dry runs and tests
//!
//! Commands run with the privileges of the remote account, which for CMS
//! hosts is commonly root. Callers must treat the session as a full
//! administrative trust boundary; every dynamic argument built by this
//! crate goes through [`shell::quote`].

pub mod error;
pub mod memory;
pub mod shell;
pub mod ssh;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use memory::MemoryHost;
pub use shell::{RemoteShell, quote};
pub use ssh::{SshSession, with_session};
pub use types::{CommandOutput, Credentials, HostConfig, RemoteFile};
