//! In-memory remote host.
//!
//! `MemoryHost` keeps a flat map of absolute paths to file contents and
//! answers `exec` from a list of scripted responses. It backs dry runs and
//! lets callers exercise deployment logic without a network.

use crate::error::{Error, Result};
use crate::shell::{RemoteShell, parent};
use crate::types::CommandOutput;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    commands: Vec<String>,
    responses: Vec<(String, CommandOutput)>,
    failing_prefixes: Vec<String>,
}

/// A fake host whose filesystem lives in memory.
#[derive(Debug)]
pub struct MemoryHost {
    host: String,
    state: Mutex<State>,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Answer any command starting with `prefix` with `output`.
    ///
    /// The first matching registration wins. Unmatched commands succeed
    /// with empty output.
    pub fn respond(&self, prefix: impl Into<String>, output: CommandOutput) {
        self.state().responses.push((prefix.into(), output));
    }

    /// Make every write, mkdir or remove under `prefix` fail.
    pub fn fail_under(&self, prefix: impl Into<String>) {
        self.state().failing_prefixes.push(prefix.into());
    }

    /// Seed a file.
    pub fn insert_file(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.state();
        state.dirs.insert(parent(&path).to_string());
        state.files.insert(path, content.into());
    }

    /// Content of a file, if present.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// Snapshot of every file, sorted by path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.state().files.clone()
    }

    /// Whether `mkdir_p` created (or was told about) a directory.
    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains(path.trim_end_matches('/'))
    }

    /// Commands passed to `exec`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    fn check_writable(state: &State, path: &str) -> Result<()> {
        if let Some(prefix) = state
            .failing_prefixes
            .iter()
            .find(|p| path.starts_with(p.as_str()))
        {
            return Err(Error::RemoteCommand {
                command: format!("write {path}"),
                exit_code: 1,
                stderr: format!("{prefix}: Permission denied"),
            });
        }
        Ok(())
    }
}

impl RemoteShell for MemoryHost {
    fn host(&self) -> &str {
        &self.host
    }

    fn exec(&self, command: &str, _stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let mut state = self.state();
        state.commands.push(command.to_string());
        let output = state
            .responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }

    fn mkdir_p(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        Self::check_writable(&state, path)?;
        let mut current = path.trim_end_matches('/').to_string();
        while current != "/" && !current.is_empty() {
            let next = parent(&current).to_string();
            state.dirs.insert(current);
            current = next;
        }
        Ok(())
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let mut state = self.state();
        Self::check_writable(&state, path)?;
        if !state.dirs.contains(parent(path)) {
            return Err(Error::RemoteCommand {
                command: format!("write {path}"),
                exit_code: 1,
                stderr: format!("{}: No such file or directory", parent(path)),
            });
        }
        state.files.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state().files.get(path).cloned())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let mut state = self.state();
        Self::check_writable(&state, path)?;
        state.files.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkdir_then_write() {
        let host = MemoryHost::new("mem");
        host.mkdir_p("/app/plugins/a/src").unwrap();
        assert!(host.has_dir("/app/plugins/a"));
        host.write_file("/app/plugins/a/src/x.js", b"x").unwrap();
        assert_eq!(host.file("/app/plugins/a/src/x.js"), Some(b"x".to_vec()));
    }

    #[test]
    fn test_write_without_parent_fails() {
        let host = MemoryHost::new("mem");
        assert!(host.write_file("/missing/file", b"x").is_err());
    }

    #[test]
    fn test_write_replaces_content() {
        let host = MemoryHost::new("mem");
        host.mkdir_p("/a").unwrap();
        host.write_file("/a/f", b"old content").unwrap();
        host.write_file("/a/f", b"new").unwrap();
        assert_eq!(host.file("/a/f"), Some(b"new".to_vec()));
        assert_eq!(host.paths(), vec!["/a/f".to_string()]);
    }

    #[test]
    fn test_fail_under_prefix() {
        let host = MemoryHost::new("mem");
        host.fail_under("/locked");
        assert!(host.mkdir_p("/locked/dir").is_err());
        assert!(host.mkdir_p("/open/dir").is_ok());
    }

    #[test]
    fn test_scripted_response() {
        let host = MemoryHost::new("mem");
        host.respond("tail", CommandOutput::new("line\n", "", 0));
        let out = host.exec("tail -n 5 /var/log/app.log", None).unwrap();
        assert_eq!(out.stdout_str(), "line\n");
        let other = host.exec("pm2 restart all", None).unwrap();
        assert!(other.success());
        assert_eq!(host.commands().len(), 2);
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let host = MemoryHost::new("mem");
        assert!(host.remove_file("/nothing").is_ok());
    }
}
