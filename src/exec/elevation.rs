// src/exec/elevation.rs

//! Privilege escalation for commands marked `sudo`.
//!
//! The engine never prompts for a password itself. Elevation is a platform
//! primitive injected through [`Elevation`]; it either hands back a command
//! that will run elevated, or fails with `ElevationDenied` /
//! `ElevationUnavailable` before anything is spawned.
//!
//! Where denial can only be seen once the elevated launcher runs (the UAC
//! prompt), the launcher exits with [`Elevation::denied_exit_code`] and the
//! supervisor reports that exit as a denied elevation instead of a command
//! failure.

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::SpawnError;
use crate::exec::shell::shell_command;

pub type ElevationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Command, SpawnError>> + Send + 'a>>;

pub trait Elevation: Send + Sync {
    /// Build a command that runs the shell text `text` with escalated
    /// privileges, in `working_directory` when one is given.
    fn elevate<'a>(
        &'a self,
        text: &'a str,
        working_directory: Option<&'a Path>,
    ) -> ElevationFuture<'a>;

    /// Exit code the elevated launcher uses to report that elevation was
    /// refused after it started.
    fn denied_exit_code(&self) -> Option<i32> {
        None
    }
}

/// `ERROR_CANCELLED`: the user dismissed the UAC prompt.
pub const UAC_CANCELLED_EXIT_CODE: i32 = 1223;

/// `sudo -n sh -c <text>` after a non-interactive credential check.
///
/// `sudo -n true` fails immediately if a password would be needed, which is
/// reported as `ElevationDenied` rather than as the command's own failure.
#[derive(Debug, Clone, Default)]
pub struct SudoElevation;

impl Elevation for SudoElevation {
    // The spawner sets the working directory; sudo keeps it.
    fn elevate<'a>(&'a self, text: &'a str, _working_directory: Option<&'a Path>) -> ElevationFuture<'a> {
        Box::pin(async move {
            #[cfg(unix)]
            {
                // SAFETY: geteuid cannot fail and touches no memory.
                if unsafe { libc::geteuid() } == 0 {
                    debug!("already root; running without sudo");
                    return Ok(shell_command(text));
                }
            }

            let preflight = Command::new("sudo")
                .args(["-n", "true"])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await;

            match preflight {
                Ok(out) if out.status.success() => {
                    let mut c = Command::new("sudo");
                    c.args(["-n", "sh", "-c", text]);
                    Ok(c)
                }
                Ok(out) => {
                    let reason = String::from_utf8_lossy(&out.stderr).trim().to_string();
                    warn!(%reason, "sudo refused non-interactive elevation");
                    Err(SpawnError::ElevationDenied(if reason.is_empty() {
                        "sudo authentication failed".to_string()
                    } else {
                        reason
                    }))
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Err(
                    SpawnError::ElevationUnavailable("`sudo` was not found on PATH".to_string()),
                ),
                Err(e) => Err(SpawnError::ElevationUnavailable(e.to_string())),
            }
        })
    }
}

/// `Start-Process -Verb RunAs -Wait -PassThru` through PowerShell.
///
/// The UAC prompt runs the command in a separate console, so its output is
/// not captured; only PowerShell's own output reaches the log. PowerShell
/// exits with the elevated command's exit code, or with
/// [`UAC_CANCELLED_EXIT_CODE`] when the prompt is dismissed.
#[derive(Debug, Clone, Default)]
pub struct RunAsElevation;

impl RunAsElevation {
    /// The PowerShell script that launches `text` elevated and forwards its
    /// exit code.
    pub fn script(text: &str, working_directory: Option<&Path>) -> String {
        let mut start = format!(
            "$p = Start-Process -FilePath 'cmd.exe' -ArgumentList '/C {}' -Verb RunAs -Wait -PassThru -WindowStyle Hidden",
            ps_quote(text)
        );
        if let Some(dir) = working_directory {
            start.push_str(&format!(
                " -WorkingDirectory '{}'",
                ps_quote(&dir.to_string_lossy())
            ));
        }
        format!(
            "$ErrorActionPreference = 'Stop'; \
             try {{ {start}; exit $p.ExitCode }} \
             catch {{ \
             $native = $_.Exception.NativeErrorCode; \
             if ($null -eq $native -and $_.Exception.InnerException) {{ $native = $_.Exception.InnerException.NativeErrorCode }}; \
             if ($native -eq {code}) {{ exit {code} }}; \
             [Console]::Error.WriteLine($_.Exception.Message); exit 1 }}",
            code = UAC_CANCELLED_EXIT_CODE,
        )
    }
}

fn ps_quote(s: &str) -> String {
    s.replace('\'', "''")
}

impl Elevation for RunAsElevation {
    fn elevate<'a>(&'a self, text: &'a str, working_directory: Option<&'a Path>) -> ElevationFuture<'a> {
        let script = Self::script(text, working_directory);
        Box::pin(async move {
            let mut c = Command::new("powershell");
            c.args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                script.as_str(),
            ]);
            Ok(c)
        })
    }

    fn denied_exit_code(&self) -> Option<i32> {
        Some(UAC_CANCELLED_EXIT_CODE)
    }
}

/// Refuses every elevation request.
#[derive(Debug, Clone)]
pub struct DenyElevation {
    pub reason: String,
}

impl Elevation for DenyElevation {
    fn elevate<'a>(&'a self, _text: &'a str, _working_directory: Option<&'a Path>) -> ElevationFuture<'a> {
        let reason = self.reason.clone();
        Box::pin(async move { Err(SpawnError::ElevationDenied(reason)) })
    }
}

/// Runs "elevated" commands with the engine's own privileges.
#[derive(Debug, Clone, Default)]
pub struct NoElevation;

impl Elevation for NoElevation {
    fn elevate<'a>(&'a self, text: &'a str, _working_directory: Option<&'a Path>) -> ElevationFuture<'a> {
        Box::pin(async move { Ok(shell_command(text)) })
    }
}

/// The elevation mechanism for the current platform.
pub fn platform_elevation() -> Box<dyn Elevation> {
    if cfg!(windows) {
        Box::new(RunAsElevation)
    } else {
        Box::new(SudoElevation)
    }
}
