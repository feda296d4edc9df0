//! SSH session over the system `ssh` client.
//!
//! The session opens one control-master connection at `connect` time and
//! multiplexes every later command over it, so credentials are presented
//! exactly once. The master is torn down by [`SshSession::dispose`] or, if
//! that never happens, when the session is dropped.
//!
//! Every command is bounded by [`HostConfig::command_timeout`]. A command
//! that overruns is killed locally and reported as a connectivity error.
//!
//! Password authentication is delegated to `sshpass -e`, which reads the
//! password from the `SSHPASS` environment variable of the child process.
//! The password never appears in an argument list.

use crate::error::{Error, Result};
use crate::shell::RemoteShell;
use crate::types::{CommandOutput, Credentials, HostConfig};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

/// Exit status used by `ssh` for its own failures.
const SSH_TRANSPORT_EXIT: i32 = 255;
/// `sshpass` exit status for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// `sshpass` exit status for a host key problem.
const SSHPASS_HOST_KEY: i32 = 6;

/// How often a running command is polled against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Stderr fragments that mean the credentials were refused.
const AUTH_MARKERS: &[&str] = &[
    "Permission denied",
    "Authentication failed",
    "Too many authentication failures",
    "no supported authentication methods",
];

/// An authenticated SSH session bound to one host.
///
/// # Example
///
/// ```no_run
/// use remote::{Credentials, HostConfig, RemoteShell, SshSession};
///
/// let config = HostConfig::new("10.0.0.5", "root", Credentials::KeyFile("/root/.ssh/id".into()));
/// let session = SshSession::connect(&config)?;
/// let out = session.exec("uptime", None)?;
/// println!("{}", out.stdout_str());
/// session.dispose()?;
/// # Ok::<(), remote::Error>(())
/// ```
#[derive(Debug)]
pub struct SshSession {
    config: HostConfig,
    control_path: PathBuf,
    released: bool,
}

impl SshSession {
    /// Authenticate and open the control-master connection.
    pub fn connect(config: &HostConfig) -> Result<Self> {
        let control_path = control_path_for(config);
        let log_path = control_path.with_extension("log");
        // A stale socket from a crashed run would make ssh refuse to listen.
        let _ = fs::remove_file(&control_path);
        let _ = fs::remove_file(&log_path);

        let mut args = vec![
            "-M".to_string(),
            "-S".to_string(),
            control_path.display().to_string(),
            "-o".to_string(),
            "ControlPersist=yes".to_string(),
            "-E".to_string(),
            log_path.display().to_string(),
            "-f".to_string(),
            "-N".to_string(),
        ];
        args.extend(connection_args(config));
        args.push(config.destination());

        let (program, mut command) = master_command(&config.credentials);
        log::info!("Connecting to {} on port {}", config.destination(), config.port);

        // The backgrounded master inherits our descriptors; keep them off
        // pipes we would wait on, and collect diagnostics from the -E log.
        let status = command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let diagnostics = fs::read_to_string(&log_path).unwrap_or_default();
        let _ = fs::remove_file(&log_path);

        if status.success() {
            log::debug!("Control master ready at {}", control_path.display());
            return Ok(Self {
                config: config.clone(),
                control_path,
                released: false,
            });
        }

        Err(classify_connect_failure(
            &config.host,
            status.code(),
            diagnostics.trim(),
        ))
    }

    /// Host configuration this session was opened with.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Whether the control master still answers.
    pub fn is_alive(&self) -> bool {
        Command::new("ssh")
            .arg("-S")
            .arg(&self.control_path)
            .args(["-O", "check"])
            .arg(self.config.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Release the transport.
    ///
    /// Consumes the session, so it can only be called once; `Drop` will not
    /// release again afterwards.
    pub fn dispose(mut self) -> Result<()> {
        self.released = true;
        self.release()
    }

    fn release(&self) -> Result<()> {
        log::debug!("Closing control master for {}", self.config.destination());
        let output = Command::new("ssh")
            .arg("-S")
            .arg(&self.control_path)
            .args(["-O", "exit"])
            .arg(self.config.destination())
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                program: "ssh".to_string(),
                source,
            })?;
        let _ = fs::remove_file(&self.control_path);

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::connectivity(
                &self.config.host,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

impl RemoteShell for SshSession {
    fn host(&self) -> &str {
        &self.config.host
    }

    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        if self.released {
            return Err(Error::Disposed {
                host: self.config.host.clone(),
            });
        }
        log::trace!("[{}] $ {}", self.config.host, command);

        let mut child = Command::new("ssh")
            .args(exec_args(&self.config, &self.control_path))
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: "ssh".to_string(),
                source,
            })?;

        // Feed stdin and drain both pipes on separate threads so a chatty
        // command cannot deadlock against a full pipe while we poll.
        let (status, stdout, stderr) = thread::scope(|scope| {
            if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
                scope.spawn(move || {
                    if let Err(e) = pipe.write_all(bytes) {
                        log::debug!("stdin write to remote command failed: {e}");
                    }
                });
            }
            let stdout = child
                .stdout
                .take()
                .map(|pipe| scope.spawn(move || drain(pipe)));
            let stderr = child
                .stderr
                .take()
                .map(|pipe| scope.spawn(move || drain(pipe)));
            let status = wait_with_deadline(&mut child, self.config.command_timeout);
            (status, join_output(stdout), join_output(stderr))
        });

        let status = status.map_err(|source| Error::Spawn {
            program: "ssh".to_string(),
            source,
        })?;
        let Some(status) = status else {
            return Err(Error::connectivity(
                &self.config.host,
                format!(
                    "`{command}` did not finish within {}s",
                    self.config.command_timeout.map_or(0, |t| t.as_secs())
                ),
            ));
        };

        let Some(exit_code) = status.code() else {
            return Err(Error::connectivity(
                &self.config.host,
                "ssh terminated by signal",
            ));
        };

        // 255 is also a legal remote exit status; only treat it as a
        // transport failure when the master is gone.
        if exit_code == SSH_TRANSPORT_EXIT && !self.is_alive() {
            return Err(Error::connectivity(
                &self.config.host,
                format!(
                    "connection lost: {}",
                    String::from_utf8_lossy(&stderr).trim()
                ),
            ));
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(e) = self.release() {
                log::debug!("Releasing session on drop failed: {e}");
            }
        }
    }
}

/// Open a session, run `f`, and release the session on every exit path.
pub fn with_session<T>(config: &HostConfig, f: impl FnOnce(&SshSession) -> T) -> Result<T> {
    let session = SshSession::connect(config)?;
    let value = f(&session);
    if let Err(e) = session.dispose() {
        log::warn!("Failed to close session to {}: {e}", config.host);
    }
    Ok(value)
}

fn master_command(credentials: &Credentials) -> (&'static str, Command) {
    match credentials {
        Credentials::Password(password) => {
            let mut command = Command::new("sshpass");
            command.env("SSHPASS", password).args(["-e", "ssh"]);
            ("sshpass", command)
        }
        Credentials::KeyFile(_) => ("ssh", Command::new("ssh")),
    }
}

fn connection_args(config: &HostConfig) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        config.port.to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", config.connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
        "-o".to_string(),
        "ServerAliveCountMax=3".to_string(),
    ];

    if config.strict_host_key_checking {
        args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()]);
    } else {
        args.extend([
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ]);
    }

    match &config.credentials {
        Credentials::KeyFile(path) => {
            args.extend([
                "-i".to_string(),
                path.display().to_string(),
                "-o".to_string(),
                "IdentitiesOnly=yes".to_string(),
                "-o".to_string(),
                "BatchMode=yes".to_string(),
            ]);
        }
        Credentials::Password(_) => {
            args.extend([
                "-o".to_string(),
                "PreferredAuthentications=password,keyboard-interactive".to_string(),
                "-o".to_string(),
                "PubkeyAuthentication=no".to_string(),
                "-o".to_string(),
                "NumberOfPasswordPrompts=1".to_string(),
            ]);
        }
    }

    args
}

/// Arguments for one command multiplexed over the control master.
///
/// If the master is gone, ssh would fall back to a fresh connection; batch
/// mode makes that attempt fail instead of prompting for a password.
fn exec_args(config: &HostConfig, control_path: &Path) -> Vec<String> {
    vec![
        "-S".to_string(),
        control_path.display().to_string(),
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", config.connect_timeout.as_secs().max(1)),
        "-p".to_string(),
        config.port.to_string(),
        config.destination(),
        "--".to_string(),
    ]
}

fn drain(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf) {
        log::debug!("reading remote command output failed: {e}");
    }
    buf
}

fn join_output(handle: Option<ScopedJoinHandle<'_, Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Wait for `child`, killing it once `timeout` has elapsed.
///
/// Returns `Ok(None)` when the deadline was hit.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn control_path_for(config: &HostConfig) -> PathBuf {
    control_path_in(&std::env::temp_dir(), config)
}

/// Socket path with a fixed-length name, whatever the host name length.
fn control_path_in(dir: &Path, config: &HostConfig) -> PathBuf {
    let target = format!("{}:{}", config.destination(), config.port);
    let digest = blake3::hash(target.as_bytes()).to_hex();
    dir.join(format!(
        "nocodeploy-{}-{}.sock",
        std::process::id(),
        &digest.as_str()[..16]
    ))
}

fn classify_connect_failure(host: &str, code: Option<i32>, diagnostics: &str) -> Error {
    let message = if diagnostics.is_empty() {
        format!("ssh exited with {}", code.map_or("signal".to_string(), |c| c.to_string()))
    } else {
        diagnostics.to_string()
    };

    match code {
        Some(SSHPASS_BAD_PASSWORD) => Error::authentication(host, "password rejected"),
        Some(SSHPASS_HOST_KEY) => Error::connectivity(host, "host key is unknown or changed"),
        _ if AUTH_MARKERS.iter().any(|m| diagnostics.contains(m)) => {
            Error::authentication(host, message)
        }
        _ => Error::connectivity(host, message),
    }
}
