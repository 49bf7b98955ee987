// src/exec/spawner.rs

//! OS process creation for a single command definition.

use std::io;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::SpawnError;
use crate::exec::elevation::{platform_elevation, Elevation};
use crate::exec::shell;
use crate::types::CommandDefinition;

/// Longest line kept in one piece; longer output is split into chunks of
/// this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Line-oriented reader over a child pipe.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the
/// stream, and trailing `\r\n` / `\n` are stripped. Output without newlines
/// is cut every `max_line_bytes` so memory stays bounded.
#[derive(Debug)]
pub struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_line_bytes(inner, MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(inner: R, max_line_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Next line, or `None` at EOF.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let mut terminated = false;

        while !terminated && self.buf.len() < self.max_line_bytes {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            let room = self.max_line_bytes - self.buf.len();
            // One byte past the cap, so a newline right at the cap still
            // ends this line instead of producing an empty one.
            let window = &available[..available.len().min(room + 1)];
            let used = match window.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    terminated = true;
                    i + 1
                }
                None => window.len().min(room),
            };
            self.buf.extend_from_slice(&window[..used]);
            self.reader.consume(used);
        }

        if self.buf.is_empty() && !terminated {
            return Ok(None);
        }
        if terminated {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// A launched process: its pid, its two output streams, and the means to
/// wait for or terminate it.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    denied_exit_code: Option<i32>,
    child: Child,
    stdout: Option<OutputLines<ChildStdout>>,
    stderr: Option<OutputLines<ChildStderr>>,
}

impl ProcessHandle {
    fn new(mut child: Child, denied_exit_code: Option<i32>) -> Self {
        let pid = child.id();
        let stdout = child.stdout.take().map(OutputLines::new);
        let stderr = child.stderr.take().map(OutputLines::new);
        Self {
            pid,
            denied_exit_code,
            child,
            stdout,
            stderr,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code meaning the elevated launcher was refused elevation.
    pub fn elevation_denied_code(&self) -> Option<i32> {
        self.denied_exit_code
    }

    pub fn take_stdout(&mut self) -> Option<OutputLines<ChildStdout>> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<OutputLines<ChildStderr>> {
        self.stderr.take()
    }

    /// Request termination; see [`shell::terminate`].
    pub fn kill(&mut self) -> io::Result<()> {
        shell::terminate(&mut self.child)
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Wait for the process to exit, terminating it if `stop` fires first.
    ///
    /// The flag is true when the exit followed our termination. An exit that
    /// was already observable when the stop arrived keeps its own status.
    pub async fn wait_or_stop(
        &mut self,
        stop: &mut oneshot::Receiver<()>,
    ) -> (io::Result<ExitStatus>, bool) {
        tokio::select! {
            biased;

            res = self.child.wait() => (res, false),

            Ok(()) = stop => {
                if let Ok(Some(status)) = self.child.try_wait() {
                    debug!(pid = ?self.pid, "process exited before stop took effect");
                    return (Ok(status), false);
                }
                info!(pid = ?self.pid, "stop requested; terminating process");
                if let Err(e) = self.kill() {
                    warn!(pid = ?self.pid, error = %e, "failed to terminate process");
                }
                (self.child.wait().await, true)
            }
        }
    }
}

/// Creates OS processes for command definitions.
///
/// Touches nothing but the OS: logging output and tracking state is the
/// controller's job.
#[derive(Clone)]
pub struct ProcessSpawner {
    elevation: Arc<dyn Elevation>,
}

impl std::fmt::Debug for ProcessSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSpawner").finish_non_exhaustive()
    }
}

impl Default for ProcessSpawner {
    fn default() -> Self {
        Self::new(Arc::from(platform_elevation()))
    }
}

impl ProcessSpawner {
    pub fn new(elevation: Arc<dyn Elevation>) -> Self {
        Self { elevation }
    }

    pub async fn spawn(&self, def: &CommandDefinition) -> Result<ProcessHandle, SpawnError> {
        if let Some(dir) = &def.working_directory {
            validate_working_directory(dir).await?;
        }

        let mut cmd = if def.sudo {
            self.elevation
                .elevate(&def.command, def.working_directory.as_deref())
                .await?
        } else {
            shell::shell_command(&def.command)
        };

        if let Some(dir) = &def.working_directory {
            cmd.current_dir(dir);
        }
        shell::configure(&mut cmd);

        let child = cmd.spawn().map_err(|source| SpawnError::Io {
            command: def.command.clone(),
            source,
        })?;

        let denied_exit_code = if def.sudo {
            self.elevation.denied_exit_code()
        } else {
            None
        };
        let handle = ProcessHandle::new(child, denied_exit_code);
        info!(
            command_id = def.id,
            pid = ?handle.pid(),
            sudo = def.sudo,
            cmd = %def.command,
            "process spawned"
        );
        Ok(handle)
    }
}

async fn validate_working_directory(dir: &Path) -> Result<(), SpawnError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SpawnError::WorkingDirectoryInvalid {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => {
            debug!(path = ?dir, error = %e, "working directory lookup failed");
            let reason = if e.kind() == io::ErrorKind::NotFound {
                "does not exist".to_string()
            } else {
                e.to_string()
            };
            Err(SpawnError::WorkingDirectoryInvalid {
                path: dir.to_path_buf(),
                reason,
            })
        }
    }
}
