//! The `RemoteShell` trait and POSIX shell helpers.
//!
//! Every transport implements `exec`; the file primitives have default
//! implementations that compose plain POSIX commands, so a transport only
//! needs to override them when it has a cheaper native path.

use crate::error::{Error, Result};
use crate::types::CommandOutput;

/// Exit code used by `read_file` to signal a missing file.
const MISSING_FILE_EXIT: i32 = 44;

/// An authenticated channel able to run commands on one host.
pub trait RemoteShell: Send + Sync {
    /// Host this shell is bound to (for messages).
    fn host(&self) -> &str;

    /// Run a command through the remote shell.
    ///
    /// A non-zero exit is returned as a normal [`CommandOutput`]; only a
    /// transport failure is an `Err`.
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput>;

    /// Run a command and turn a non-zero exit into [`Error::RemoteCommand`].
    fn exec_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.exec(command, None)?;
        ensure_success(command, output)
    }

    /// Create a directory and its parents. Succeeds if it already exists.
    fn mkdir_p(&self, path: &str) -> Result<()> {
        self.exec_checked(&format!("mkdir -p {}", quote(path)))
            .map(|_| ())
    }

    /// Replace a file's content atomically (temp sibling, then rename).
    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let tmp = format!("{path}.nocodeploy.tmp");
        let command = format!(
            "cat > {tmp} && mv -f {tmp} {dest}",
            tmp = quote(&tmp),
            dest = quote(path)
        );
        let output = self.exec(&command, Some(content))?;
        ensure_success(&command, output).map(|_| ())
    }

    /// Read a file, returning `None` if it does not exist.
    fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let quoted = quote(path);
        let command =
            format!("if [ -f {quoted} ]; then cat {quoted}; else exit {MISSING_FILE_EXIT}; fi");
        let output = self.exec(&command, None)?;
        if output.exit_code == MISSING_FILE_EXIT {
            return Ok(None);
        }
        ensure_success(&command, output).map(|o| Some(o.stdout))
    }

    /// Remove a file. Succeeds if it is already gone.
    fn remove_file(&self, path: &str) -> Result<()> {
        self.exec_checked(&format!("rm -f {}", quote(path)))
            .map(|_| ())
    }
}

fn ensure_success(command: &str, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(Error::RemoteCommand {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr_str().trim().to_string(),
        })
    }
}

/// Quote a value for a POSIX shell.
///
/// The result is always a single-quoted word, so the value is passed as
/// data no matter which characters it contains.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Join a directory and a relative path with a single `/`.
pub fn join(dir: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Parent directory of a remote path (`/` for top-level entries).
pub fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}
