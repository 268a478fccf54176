//! Guarded subprocess runner backing the `execute_command` tool.
//!
//! Built for content-generation pipelines (document converters,
//! typesetters). The guarantees are deliberately narrow:
//!
//! - **Whitelist only.** A command not on the whitelist fails with
//!   [`Error::CommandNotAllowed`] before any process is spawned.
//! - **No shell.** Arguments are passed as a vector; pipes, redirects and
//!   semicolons in argv are plain bytes.
//! - **Bounded output.** Each stream is captured up to a hard cap (default
//!   10 MiB); excess bytes are dropped.
//! - **Bounded time.** On timeout (default 5 minutes) the child is
//!   terminated, then force-killed after a 5 second grace.
//!
//! The environment is inherited from the parent and overlaid with the
//! configured map. The working directory is created when missing and
//! verified usable before the spawn.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Default per-command wall-clock timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Default per-stream capture cap.
pub const DEFAULT_MAX_STREAM_BYTES: usize = 10 * 1024 * 1024;

/// How long a terminated child gets before the force-kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// The default whitelist: read-only and harmless.
pub const READ_ONLY_COMMANDS: &[&str] =
    &["echo", "cat", "ls", "pwd", "which", "whoami", "date", "uname"];

/// Document tooling added by the content-creation preset.
pub const CONTENT_CREATION_COMMANDS: &[&str] =
    &["pandoc", "typst", "tectonic", "dot", "wkhtmltopdf"];

/// Outcome of one guarded command execution.
///
/// `success` holds exactly when the process exited 0 and did not time out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,

    /// Captured stdout, up to the stream cap.
    pub stdout: String,

    /// Captured stderr, up to the stream cap.
    pub stderr: String,

    /// Exit code, absent when the process was killed by a signal.
    pub exit_code: Option<i32>,

    /// Terminating signal number, when applicable (Unix).
    pub signal: Option<i32>,

    /// The executed command name.
    pub command: String,

    /// The argument vector as passed.
    pub args: Vec<String>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// True when the timeout expired before the process exited.
    pub timed_out: bool,

    /// Spawn or supervision error, when the process could not run normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whitelist-only subprocess runner.
///
/// ```
/// use bmad_runtime::CommandExecutor;
///
/// let runner = CommandExecutor::content_creation()
///     .with_command("mmdc")
///     .with_env("TZ", "UTC");
/// assert!(runner.is_allowed("pandoc"));
/// assert!(!runner.is_allowed("rm"));
/// ```
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    whitelist: HashSet<String>,
    working_directory: PathBuf,
    env: BTreeMap<String, String>,
    timeout: Duration,
    max_stream_bytes: usize,
}

impl CommandExecutor {
    fn with_whitelist(commands: &[&str]) -> Self {
        Self {
            whitelist: commands.iter().map(|c| c.to_string()).collect(),
            working_directory: PathBuf::from("."),
            env: BTreeMap::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            max_stream_bytes: DEFAULT_MAX_STREAM_BYTES,
        }
    }

    /// Runner with the default read-only whitelist.
    pub fn read_only() -> Self {
        Self::with_whitelist(READ_ONLY_COMMANDS)
    }

    /// Runner with the read-only whitelist plus document tooling.
    pub fn content_creation() -> Self {
        let mut executor = Self::with_whitelist(READ_ONLY_COMMANDS);
        for command in CONTENT_CREATION_COMMANDS {
            executor.whitelist.insert(command.to_string());
        }
        executor
    }

    /// Adds a single command to the whitelist.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.whitelist.insert(command.into());
        self
    }

    /// Sets the default working directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Adds an environment overlay entry.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the per-stream capture cap.
    pub fn with_max_stream_bytes(mut self, bytes: usize) -> Self {
        self.max_stream_bytes = bytes;
        self
    }

    /// True when the command is on the whitelist.
    pub fn is_allowed(&self, command: &str) -> bool {
        self.whitelist.contains(command)
    }

    /// Runs a whitelisted command to completion.
    ///
    /// # Errors
    ///
    /// [`Error::CommandNotAllowed`] before any spawn for non-whitelisted
    /// commands; [`Error::Other`] when the working directory cannot be
    /// prepared. A command that spawns but fails or times out still returns
    /// `Ok` with the failure captured in the [`CommandResult`].
    pub async fn execute(
        &self,
        command: &str,
        args: &[String],
        working_directory: Option<&Path>,
    ) -> Result<CommandResult> {
        if !self.is_allowed(command) {
            return Err(Error::CommandNotAllowed(command.to_string()));
        }

        let workdir = working_directory.unwrap_or(&self.working_directory);
        ensure_working_directory(workdir)?;

        log::debug!("executing {command} {args:?} in {}", workdir.display());
        let started = Instant::now();

        let spawned = Command::new(command)
            .args(args)
            .current_dir(workdir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return Ok(CommandResult {
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    signal: None,
                    command: command.to_string(),
                    args: args.to_vec(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    timed_out: false,
                    error: Some(format!("failed to spawn {command}: {e}")),
                });
            }
        };

        // Drain both pipes while waiting, so a chatty child never blocks on
        // a full pipe buffer.
        let stdout_task = tokio::spawn(drain_capped(child.stdout.take(), self.max_stream_bytes));
        let stderr_task = tokio::spawn(drain_capped(child.stderr.take(), self.max_stream_bytes));

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        let (exit_status, timed_out) = match waited {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                return Err(Error::other(format!("failed waiting for {command}: {e}")));
            }
            Err(_) => {
                log::warn!(
                    "{command} exceeded {:?} timeout, terminating",
                    self.timeout
                );
                let _ = child.start_kill();
                let grace = tokio::time::timeout(KILL_GRACE, child.wait()).await;
                let status = match grace {
                    Ok(Ok(status)) => Some(status),
                    _ => {
                        let _ = child.kill().await;
                        child.wait().await.ok()
                    }
                };
                (status, true)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let exit_code = exit_status.and_then(|s| s.code());
        #[cfg(unix)]
        let signal = exit_status.and_then(|s| {
            use std::os::unix::process::ExitStatusExt;
            s.signal()
        });
        #[cfg(not(unix))]
        let signal = None;

        Ok(CommandResult {
            success: exit_code == Some(0) && !timed_out,
            stdout,
            stderr,
            exit_code,
            signal,
            command: command.to_string(),
            args: args.to_vec(),
            duration_ms: started.elapsed().as_millis() as u64,
            timed_out,
            error: None,
        })
    }
}

/// Creates the working directory if missing and verifies it is usable.
fn ensure_working_directory(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::other(format!(
            "cannot create working directory {}: {e}",
            dir.display()
        ))
    })?;
    let metadata = std::fs::metadata(dir)
        .map_err(|e| Error::other(format!("cannot stat working directory {}: {e}", dir.display())))?;
    if !metadata.is_dir() {
        return Err(Error::other(format!(
            "working directory {} is not a directory",
            dir.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o700 != 0o700 {
            return Err(Error::other(format!(
                "working directory {} lacks rwx permissions",
                dir.display()
            )));
        }
    }
    Ok(())
}

/// Reads a pipe to EOF, keeping at most `cap` bytes.
///
/// The pipe is drained fully either way; only the captured prefix is kept.
async fn drain_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if captured.len() < cap {
                    let take = (cap - captured.len()).min(n);
                    captured.extend_from_slice(&chunk[..take]);
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&captured).into_owned()
}
