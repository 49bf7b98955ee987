// src/engine/notify.rs

//! Desktop notification seam.
//!
//! The engine only decides *whether* and *what* to notify; delivery is an
//! external collaborator behind [`Notifier`].

use tracing::info;

use crate::types::ExecutionStatus;

pub trait Notifier: Send + Sync {
    /// Show a notification. Failures are reported back but never affect
    /// execution state.
    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Default notifier: writes the notification to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        info!(title, body, "notification");
        Ok(())
    }
}

/// Title and body for a finished command, or `None` if this status does
/// not notify.
pub fn finish_message(
    command_name: &str,
    status: ExecutionStatus,
    exit_code: Option<i32>,
    notify_on_stopped: bool,
) -> Option<(String, String)> {
    match status {
        ExecutionStatus::Success => Some((
            "Command succeeded".to_string(),
            format!("Command \"{command_name}\" completed successfully"),
        )),
        ExecutionStatus::Failed => {
            let body = match exit_code {
                Some(code) => format!("Command \"{command_name}\" failed (exit code: {code})"),
                None => format!("Command \"{command_name}\" failed"),
            };
            Some(("Command failed".to_string(), body))
        }
        ExecutionStatus::Stopped if notify_on_stopped => Some((
            "Command stopped".to_string(),
            format!("Command \"{command_name}\" was stopped"),
        )),
        _ => None,
    }
}
