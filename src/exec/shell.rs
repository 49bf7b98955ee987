// src/exec/shell.rs

//! Platform shell invocation and process termination.

use std::io;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

/// Build a command that runs `text` through the platform shell, so pipes,
/// redirection and builtins behave as they do in a terminal.
pub fn shell_command(text: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(text);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(text);
        c
    }
}

/// Apply the stdio / process-group settings every spawned command shares.
///
/// - stdout and stderr are piped for capture; stdin is null.
/// - On Unix the child leads a fresh process group so [`terminate`] can
///   take down pipelines and grandchildren along with the shell.
/// - The environment is inherited unchanged.
pub fn configure(cmd: &mut Command) {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
    }
}

/// Request termination of a child and everything in its process group.
///
/// This does not wait for the process to exit; the exit waiter observes
/// that. A process that has already been reaped is a no-op.
pub fn terminate(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        debug!("terminate: child already reaped");
        return Ok(());
    };

    #[cfg(unix)]
    {
        // SAFETY: killpg has no memory-safety preconditions; the pgid is the
        // child's pid because it was spawned with process_group(0).
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc == 0 {
            debug!(pid, "sent SIGKILL to process group");
            return Ok(());
        }
        let err = io::Error::last_os_error();
        debug!(pid, error = %err, "killpg failed; falling back to direct kill");
    }

    #[cfg(not(unix))]
    debug!(pid, "killing child process");

    child.start_kill()
}

/// Whether the process was terminated by a signal rather than exiting.
#[cfg(unix)]
pub fn killed_by_signal(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
pub fn killed_by_signal(_status: &std::process::ExitStatus) -> bool {
    false
}
